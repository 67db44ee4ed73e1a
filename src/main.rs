use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Detect P-core count on Apple Silicon via sysctlbyname(3), fall back to
/// available_parallelism. Only runs on aarch64 macOS — Intel Macs don't
/// have P/E core distinction. Used as the default `workers` value.
fn default_worker_count() -> usize {
    #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
    {
        let mut val: i32 = 0;
        let mut size = std::mem::size_of::<i32>();
        let name = b"hw.perflevel0.logicalcpu\0";
        let ret = unsafe {
            libc::sysctlbyname(
                name.as_ptr() as *const libc::c_char,
                &mut val as *mut i32 as *mut libc::c_void,
                &mut size,
                std::ptr::null_mut(),
                0,
            )
        };
        if ret == 0 && val > 0 {
            return val as usize;
        }
    }
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Minimal clap front-end: just enough to get `--help`/`--version` and a
/// friendly usage line for free. The real option surface (`in=`, `out=`,
/// `key=`, …) is a flat token list handled by [`jxtract::config::parse_args`]
/// — clap only captures it as opaque trailing args.
#[derive(clap::Parser)]
#[command(
    name = "jxtract",
    about = "Extract a named JSON array from a large document, streaming",
    version,
    after_help = "Example:\n\n\t$ jxtract in=accounts.json out=accounts.ndjson key=accounts\n\t$ cat big.json | jxtract key=items split-lines=100000 split-prefix=/tmp/items"
)]
struct Cli {
    /// key=value / bare-flag tokens: in=, out=, key=, ndjson, no-ndjson,
    /// split-lines=, split-prefix=, buffer=, workers=, tmpdir=, verbose
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    tokens: Vec<String>,
}

fn main() {
    #[cfg(unix)]
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }

    let cli = <Cli as clap::Parser>::parse();

    let config = match jxtract::config::parse_args(&cli.tokens, default_worker_count()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("jxtract: {e}");
            std::process::exit(e.exit_code());
        }
    };

    jxtract::logging::init(config.verbose);

    let source_name = match &config.input {
        jxtract::config::InputSource::Stdin => "<stdin>".to_string(),
        jxtract::config::InputSource::File(path) => path.display().to_string(),
    };

    let result = run(&config, &source_name);

    match result {
        Ok(n) => {
            tracing::info!(elements = n, "extraction complete");
        }
        Err(e) => {
            eprintln!("jxtract: {e}");
            std::process::exit(e.exit_code());
        }
    }
}

fn run(config: &jxtract::config::ExtractorConfig, source_name: &str) -> jxtract::error::Result<u64> {
    let stderr = io::stderr();
    let mut err = BufWriter::new(stderr.lock());

    let result = match &config.input {
        jxtract::config::InputSource::Stdin => {
            let reader = jxtract::strip_bom_reader(io::stdin().lock())
                .map_err(|e| jxtract::error::ExtractError::io(source_name, e))?;
            dispatch(reader, config, source_name, &mut err)
        }
        jxtract::config::InputSource::File(path) => {
            let file = File::open(path).map_err(|e| {
                if e.kind() == io::ErrorKind::NotFound {
                    jxtract::error::ExtractError::input_not_found(path)
                } else {
                    jxtract::error::ExtractError::io(path, e)
                }
            })?;
            let reader = jxtract::strip_bom_reader(BufReader::new(file))
                .map_err(|e| jxtract::error::ExtractError::io(path, e))?;
            dispatch(reader, config, source_name, &mut err)
        }
    };

    let _ = err.flush();
    result
}

fn dispatch<R: io::Read>(
    reader: R,
    config: &jxtract::config::ExtractorConfig,
    source_name: &str,
    err: &mut impl Write,
) -> jxtract::error::Result<u64> {
    if config.workers > 1 {
        jxtract::parallel::run_parallel(reader, config, source_name, err)
    } else {
        jxtract::extractor::run_sequential(reader, config, source_name, err)
    }
}

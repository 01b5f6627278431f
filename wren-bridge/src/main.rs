use clap::Parser;
use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    process, thread,
    time::Duration,
};

use wren_bridge::{Config, InterpretResult, ModuleLoader, NativeApi, OwnedVM, native};

const EXIT_COMPILE_ERROR: i32 = 65;
const EXIT_RUNTIME_ERROR: i32 = 70;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Script to run; its directory is searched for imported modules
    #[arg(help = "The .wren file to execute")]
    script: PathBuf,

    #[arg(long, help = "Module name of the script (defaults to the file stem)")]
    module: Option<String>,

    #[arg(long, help = "Native VM library to load instead of $WREN_LIBRARY")]
    library: Option<PathBuf>,

    #[arg(long, help = "Stop the script after this many milliseconds")]
    timeout_ms: Option<u64>,

    #[arg(long, help = "Bytes to allocate before the first collection")]
    initial_heap: Option<usize>,

    #[arg(long, help = "Lower bound for the heap size after a collection")]
    min_heap: Option<usize>,

    #[arg(long, help = "Percentage the heap may grow past live data before collecting")]
    heap_growth: Option<i32>,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    process::exit(run(&cli));
}

/// Script output is best effort; a closed stdout must not abort the script.
fn forward(out: &mut impl Write, text: &str) -> bool {
    match out.write_all(text.as_bytes()).and_then(|()| out.flush()) {
        Ok(()) => true,
        Err(err) => {
            log::warn!("could not write script output: {err}");
            false
        }
    }
}

fn run(cli: &Cli) -> i32 {
    let source = match fs::read_to_string(&cli.script) {
        Ok(content) => content,
        Err(err) => {
            eprintln!("Error reading file '{}': {}", cli.script.display(), err);
            return 1;
        }
    };

    let api = match &cli.library {
        Some(path) => NativeApi::load(path).map(NativeApi::leak),
        None => native::api(),
    };
    let api = match api {
        Ok(api) => api,
        Err(err) => {
            eprintln!("{err}");
            return 1;
        }
    };

    let config = Config {
        initial_heap_size: cli.initial_heap,
        min_heap_size: cli.min_heap,
        heap_growth_percent: cli.heap_growth,
        ..Config::default()
    }
    .with_write(|_, text| {
        forward(&mut io::stdout().lock(), text);
    })
    .with_error(|_, report| eprintln!("{report}"));

    let root = cli.script.parent().unwrap_or(Path::new("."));
    let config = ModuleLoader::with_root(root).install(config);

    let vm = match OwnedVM::with_api(api, config) {
        Ok(vm) => vm,
        Err(err) => {
            eprintln!("{err}");
            return 1;
        }
    };

    if let Some(ms) = cli.timeout_ms {
        let exit = vm.exit_handle();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(ms));
            if exit.early_exit() {
                log::warn!("script stopped after {ms}ms");
            }
        });
    }

    let module = cli.module.clone().unwrap_or_else(|| {
        cli.script
            .file_stem()
            .map_or_else(|| "main".to_owned(), |stem| stem.to_string_lossy().into_owned())
    });

    match vm.interpret(&module, &source) {
        Ok(InterpretResult::Success) => 0,
        Ok(InterpretResult::CompileError) => EXIT_COMPILE_ERROR,
        Ok(InterpretResult::RuntimeError) => EXIT_RUNTIME_ERROR,
        Err(err) => {
            eprintln!("Error executing {}: {}", cli.script.display(), err);
            1
        }
    }
}

use clap::Parser;
use shadeweave::{
    Config, HeadlessDevice, HotReloader, ShaderId, ShaderManager, ShaderProgram,
};
use std::path::Path;
use std::process;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Parser)]
#[command(
    name = "shadeweave",
    version = env!("CARGO_PKG_VERSION"),
    about = "shadeweave - pre-process, modify and link GLSL shader programs",
    long_about = "shadeweave resolves imports, pre-definitions and modifications for every program in a project, compiles the result against a headless device with naga validation and reports the programs that fail."
)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(value_name = "CONFIG")]
    config_file: String,

    /// Only compile this program
    #[arg(long, value_name = "ID")]
    program: Option<String>,

    /// Print the pre-processed source of every stage
    #[arg(long)]
    print: bool,

    /// Keep running and recompile when files change, also enabled by `[hot_reload]`
    #[arg(long)]
    watch: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if let Err(exit_code) = run_with_error_handling(&args) {
        process::exit(exit_code);
    }
}

fn run_with_error_handling(args: &Args) -> Result<(), i32> {
    let config_path = Path::new(&args.config_file);
    if !config_path.is_file() {
        eprintln!("Error: Configuration file '{}' does not exist.", args.config_file);
        return Err(1);
    }

    let config = Config::load(config_path).map_err(|err| {
        eprintln!("Error: {}", err);
        1
    })?;

    let device = HeadlessDevice::new().with_naga_validation(true);
    let mut manager = ShaderManager::from_config(&config, device).map_err(|err| {
        eprintln!("Error: {}", err);
        1
    })?;

    let failed = match &args.program {
        Some(program) => {
            let id: ShaderId = program.parse().map_err(|err| {
                eprintln!("Error: {}", err);
                1
            })?;
            match manager.recompile(&id) {
                Ok(()) => 0,
                Err(err) => {
                    eprintln!("{}", err.diagnostic());
                    1
                }
            }
        }
        None => {
            let errors = manager.compile_all();
            for (id, err) in &errors {
                eprintln!("{}: {}", id, err.diagnostic());
            }
            errors.len()
        }
    };

    if args.print {
        let ids: Vec<ShaderId> = manager.program_ids().cloned().collect();
        for id in ids.iter().filter(|id| args.program.as_deref().is_none_or(|p| p == id.to_string())) {
            if let Some(program) = manager.program(id) {
                print_program(manager.device(), id, program);
            }
        }
    }

    if config.watch_requested(args.watch) {
        watch(&config, &mut manager)?;
    }

    manager.free();
    if failed > 0 {
        eprintln!("{} program(s) failed to compile.", failed);
        return Err(1);
    }
    Ok(())
}

fn print_program(device: &HeadlessDevice, id: &ShaderId, program: &ShaderProgram) {
    for stage in program.stages() {
        println!("// {} {} shader", id, stage.kind());
        if let Some(source) = device.shader_source_of(stage.handle()) {
            println!("{}", source);
        }
    }
}

fn watch(config: &Config, manager: &mut ShaderManager<HeadlessDevice>) -> Result<(), i32> {
    let mut reloader = HotReloader::new(&config.sources.root).map_err(|err| {
        eprintln!("Error: Failed to watch {}: {}", config.sources.root.display(), err);
        1
    })?;
    if let Some(programs) = &config.sources.programs {
        if let Err(err) = reloader.watch(programs) {
            log::warn!("Not watching {}: {}", programs.display(), err);
        }
    }

    log::info!("Watching for changes, press Ctrl-C to stop");
    loop {
        std::thread::sleep(POLL_INTERVAL);
        if !reloader.check_for_changes() {
            continue;
        }
        for (id, err) in manager.poll_hot_reload(&reloader) {
            eprintln!("{}: {}", id, err.diagnostic());
        }
    }
}

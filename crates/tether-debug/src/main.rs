use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::Parser;
use tether_config::{TetherConfig, CONFIG_ENV_VAR};
use tether_debug::format::{render_class, render_fields, render_result, render_stack};
use tether_debug::{
    demo, BreakpointKey, BreakpointProperties, Debugger, DebuggerEvent, MirrorValue, Session,
    DEFAULT_SCOPE,
};
use tether_runtime::{ExecutionEnvironment, LocalVm};

const POLL: Duration = Duration::from_millis(50);

/// Run the demo debuggee under the Tether controller.
///
/// Each breakpoint hit prints the stack of the stopped thread and continues.
#[derive(Debug, Parser)]
#[command(name = "tether", version, about)]
struct Cli {
    /// Path to a TOML config file.
    ///
    /// If unset, `TETHER_CONFIG` is used as a fallback. When neither is
    /// provided the built-in defaults apply.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Line breakpoint as `Class:line`, e.g. `demo.Account:11`. Repeatable.
    #[arg(long = "break", value_name = "CLASS:LINE", value_parser = parse_breakpoint)]
    breakpoints: Vec<BreakpointKey>,

    /// Break only on the N-th hit of each breakpoint.
    #[arg(long, value_name = "N")]
    hit_count: Option<u32>,

    /// Suspend when an exception escapes the program.
    #[arg(long)]
    break_on_uncaught: bool,
}

fn parse_breakpoint(raw: &str) -> Result<BreakpointKey, String> {
    let (class, line) = raw
        .rsplit_once(':')
        .ok_or_else(|| format!("expected CLASS:LINE, got `{raw}`"))?;
    let line = line
        .parse()
        .map_err(|_| format!("`{line}` is not a line number"))?;
    Ok(BreakpointKey::Line {
        class: class.to_string(),
        line,
    })
}

fn load_config(cli_path: Option<PathBuf>) -> TetherConfig {
    let path = cli_path.or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from));
    let Some(path) = path else {
        return TetherConfig::default();
    };

    match TetherConfig::load_from_path(&path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!(
                "tether: failed to load config from {}: {err}; continuing with defaults",
                path.display()
            );
            TetherConfig::default()
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config);
    tether_config::init_tracing(&config.logging);
    if cli.break_on_uncaught {
        config.debugger.break_on_uncaught = true;
    }

    let vm = Arc::new(LocalVm::new());
    demo::install(&vm);
    let session = Arc::new(Session::new(vm, config.debugger));
    session.add_listener(Arc::new(|event: &DebuggerEvent| match event {
        DebuggerEvent::Breakpoint {
            thread,
            location: Some(location),
        } => println!("[thread {thread}] breakpoint at {location}"),
        DebuggerEvent::Exception {
            thread,
            description,
            suspended,
        } => println!(
            "[thread {thread}] exception {}{}",
            description.type_name,
            if *suspended { " (suspended)" } else { "" }
        ),
        other => tracing::debug!(target: "tether.debug", ?other, "event"),
    }))?;

    session.launch().context("launching the debuggee")?;

    let mut properties = BreakpointProperties::new();
    if let Some(n) = cli.hit_count {
        properties.insert(tether_debug::HIT_COUNT.to_string(), n.to_string());
    }
    for key in &cli.breakpoints {
        if let Some(message) = session.toggle_breakpoint(key, true, &properties) {
            eprintln!("tether: {message}");
        }
    }

    let main_thread = session.get_thread(session.env().main_thread()?)?;
    let runner = {
        let session = session.clone();
        std::thread::spawn(move || session.run_class_main(demo::MAIN_CLASS))
    };
    while !runner.is_finished() {
        if main_thread.wait_until_suspended(POLL)? {
            print!("{}", render_stack(&main_thread.get_stack()?));
            main_thread.cont()?;
        }
    }
    let result = runner
        .join()
        .map_err(|_| anyhow!("main runner panicked"))??;
    println!("{} returned {}", demo::MAIN_CLASS, render_result(&result));

    print!("{}", render_class(&*session.get_class(demo::ACCOUNT_CLASS)?));
    let created = session.instantiate_class(
        demo::ACCOUNT_CLASS,
        &["String".to_string(), "int".to_string()],
        vec![
            MirrorValue::Object(session.get_mirror("\"grace\"")?),
            MirrorValue::from(100),
        ],
    )?;
    if let Some(account) = created.success().flatten() {
        let name = session.guess_new_name(account.class_name())?;
        session.add_object(DEFAULT_SCOPE, &name, &account)?;
        println!("{name} = {account}");
        print!("{}", render_fields(&session.object_fields(&account)?));
    }

    session.flush_events();
    session.close(false)?;
    Ok(())
}

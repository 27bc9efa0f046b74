use std::io::{BufRead, Write};

use clap::Parser;
use msl::environment::test_context::NullContext;
use msl::evaluator::{RootRef, Session};
use msl::{Context, Environment};

#[derive(Parser)]
#[command(name = "msl")]
#[command(about = "Console for the Mobius Scripting Language runtime")]
#[command(version)]
struct Cli {
    /// Evaluate the script given on the command line and exit
    #[arg(short = 'c')]
    script: Option<String>,

    /// Output the result as JSON instead of plain text
    #[arg(long = "json")]
    json: bool,

    /// Script file to execute
    #[arg()]
    script_file: Option<String>,
}

fn main() {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let mut env = Environment::new();
    let ctx = NullContext::default();

    if let Some(script) = cli.script {
        run_one_shot(&mut env, &ctx, "cli", &script, cli.json);
        return;
    }
    if let Some(path) = cli.script_file {
        let source = match std::fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("Error: cannot read script file: {path}: {e}");
                std::process::exit(1);
            }
        };
        run_one_shot(&mut env, &ctx, &path, &source, cli.json);
        return;
    }

    console(&mut env, &ctx);
}

/// One-shot `-c`/file evaluation: compile, install (surfacing link
/// errors the way a real host would), run the unit's body to completion.
fn run_one_shot(env: &mut Environment, ctx: &dyn Context, id: &str, source: &str, json: bool) {
    let unit = env.compile(id, source);
    let install = env.install(ctx, unit);
    if !install.errors.is_empty() {
        report(&install.errors, json);
        std::process::exit(1);
    }

    let unit = env.unit(id).expect("just installed").clone();
    let mut session = Session::new(1, unit, ctx.context_id(), RootRef::Body, Vec::new());
    msl::evaluator::run(&*env, ctx, &mut session);

    if !session.errors.is_empty() {
        report(&session.errors, json);
        std::process::exit(1);
    }

    if json {
        println!(
            "{}",
            serde_json::json!({
                "result": session.result_value.to_display_string(),
                "results": session.results.iter().map(|v| v.to_display_string()).collect::<Vec<_>>(),
            })
        );
    } else {
        println!("{}", session.result_value.to_display_string());
    }
}

fn report(errors: &[msl::MslError], json: bool) {
    if json {
        let msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        eprintln!("{}", serde_json::json!({ "errors": msgs }));
    } else {
        for e in errors {
            eprintln!("{e}");
        }
    }
}

const CONSOLE_UNIT_ID: &str = "console";

/// Line-at-a-time scriptlet console (spec.md §6 "Console/scriptlet
/// extension"): each line is parsed on its own, but its function and
/// variable declarations are structurally carried over from the prior
/// line's unit before installing (`Compilation::carry_over`), so a
/// function or variable declared on one line is visible — and a
/// variable's value survives — on the next. Installing under the same
/// id each time lets `Environment::install`'s existing garbage list
/// retire the previous unit once no session still references it.
fn console(env: &mut Environment, ctx: &dyn Context) {
    println!("msl console — one statement per line, Ctrl-D to exit");
    let stdin = std::io::stdin();
    let mut next_id: u64 = 1;
    loop {
        print!("msl> ");
        std::io::stdout().flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).unwrap_or(0) == 0 {
            break;
        }
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }

        let mut unit = env.compile(CONSOLE_UNIT_ID, line);
        if let Some(prior) = env.unit(CONSOLE_UNIT_ID) {
            unit.carry_over(prior);
        }
        let install = env.install(ctx, unit);
        if !install.errors.is_empty() {
            report(&install.errors, false);
            continue;
        }

        let unit = env.unit(CONSOLE_UNIT_ID).expect("just installed").clone();
        let mut session = Session::new(next_id, unit, ctx.context_id(), RootRef::Body, Vec::new());
        next_id += 1;
        msl::evaluator::run(&*env, ctx, &mut session);

        if !session.errors.is_empty() {
            report(&session.errors, false);
            continue;
        }
        println!("{}", session.result_value.to_display_string());
    }
}

use std::env;
use std::fs;
use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use ember::{run, ReplSession};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    match args.get(1) {
        Some(path) => run_file(path),
        None => repl(),
    }
}

fn run_file(path: &str) -> ExitCode {
    let source = match read_file(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };
    match run(&source) {
        Ok(value) => {
            println!("{value}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn read_file(path: &str) -> Result<String, String> {
    match fs::metadata(path) {
        Ok(metadata) => {
            if !metadata.is_file() {
                return Err(format!("{path} is not a file"));
            }
        }
        Err(err) => return Err(format!("cannot read {path}: {err}")),
    }
    fs::read_to_string(path).map_err(|err| format!("cannot read {path}: {err}"))
}

/// Line-at-a-time REPL. `.quit`/`.exit` leave; a line of `...` toggles
/// multi-line mode, where input accumulates until the closing `...`.
fn repl() -> ExitCode {
    println!("ember repl (.quit to leave, ... for multi-line)");
    let mut session = ReplSession::new();
    let stdin = io::stdin();
    let mut multiline: Option<String> = None;
    loop {
        let prompt = if multiline.is_some() { "... " } else { "> " };
        print!("{prompt}");
        if io::stdout().flush().is_err() {
            return ExitCode::FAILURE;
        }
        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => return ExitCode::SUCCESS, // EOF
            Ok(_) => {}
            Err(err) => {
                eprintln!("error: {err}");
                return ExitCode::FAILURE;
            }
        }
        let trimmed = line.trim_end();
        let content = trimmed.trim();
        if content == ".quit" || content == ".exit" {
            return ExitCode::SUCCESS;
        }
        if content == "..." {
            match multiline.take() {
                Some(entry) => eval_and_print(&mut session, &entry),
                None => multiline = Some(String::new()),
            }
            continue;
        }
        if let Some(buffer) = multiline.as_mut() {
            buffer.push_str(trimmed);
            buffer.push('\n');
        } else if !content.is_empty() {
            eval_and_print(&mut session, trimmed);
        }
    }
}

fn eval_and_print(session: &mut ReplSession, entry: &str) {
    match session.eval(entry) {
        Ok(value) => println!("{value}"),
        Err(err) => eprintln!("error: {err}"),
    }
}

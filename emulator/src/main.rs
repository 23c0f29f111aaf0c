mod grammar;
mod host;
mod session;

use std::env;
use std::fs;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::process;

use session::{Session, SessionOptions};

const USAGE: &str =
    "Usage: ecu-emulator [--transcript <path>] [--storage <dir>] [--script <file>] [--no-color]";

struct Options {
    session: SessionOptions,
    script: Option<PathBuf>,
}

fn main() -> io::Result<()> {
    let options = parse_options().unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("{USAGE}");
        process::exit(2);
    });

    let stdout = io::stdout();
    let mut writer = stdout.lock();
    let mut session = Session::new(&options.session)?;

    writeln!(
        writer,
        "ECU pair emulator ready. Type `help` for commands or `exit` to quit."
    )?;
    for line in session.startup()? {
        writeln!(writer, "{line}")?;
    }

    match options.script {
        Some(path) => run_script(&mut session, &fs::read_to_string(path)?, &mut writer),
        None => run_interactive(&mut session, &mut writer),
    }
}

fn run_interactive(session: &mut Session, writer: &mut impl Write) -> io::Result<()> {
    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let mut line = String::new();

    loop {
        line.clear();
        write!(writer, "> ")?;
        writer.flush()?;

        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            writeln!(writer)?;
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if should_terminate(trimmed) {
            writeln!(writer, "Session closed.")?;
            break;
        }

        for response in session.handle_command(trimmed)? {
            writeln!(writer, "{response}")?;
        }
    }

    Ok(())
}

/// Replays a command file, echoing each command. `#` starts a comment line.
fn run_script(session: &mut Session, script: &str, writer: &mut impl Write) -> io::Result<()> {
    for line in script.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        writeln!(writer, "> {line}")?;
        if should_terminate(line) {
            break;
        }
        for response in session.handle_command(line)? {
            writeln!(writer, "{response}")?;
        }
    }
    Ok(())
}

fn should_terminate(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

fn parse_options() -> Result<Options, String> {
    let mut options = Options {
        session: SessionOptions {
            color: io::stdout().is_terminal(),
            ..SessionOptions::default()
        },
        script: None,
    };

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) => (flag.to_string(), Some(value.to_string())),
            None => (arg, None),
        };
        if flag == "--no-color" {
            options.session.color = false;
            continue;
        }

        let value = match inline {
            Some(value) => value,
            None => args
                .next()
                .ok_or_else(|| format!("Expected value after {flag}"))?,
        };
        match flag.as_str() {
            "--transcript" => options.session.transcript = Some(PathBuf::from(value)),
            "--storage" => options.session.storage = Some(PathBuf::from(value)),
            "--script" => options.script = Some(PathBuf::from(value)),
            _ => return Err(format!("Unknown option `{flag}`")),
        }
    }
    Ok(options)
}

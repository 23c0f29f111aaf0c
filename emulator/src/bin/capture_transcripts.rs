use std::io;
use std::path::PathBuf;

#[path = "../grammar.rs"]
mod grammar;
#[path = "../host.rs"]
mod host;
#[allow(dead_code)]
#[path = "../session.rs"]
mod session;

use session::{Session, SessionOptions};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Scenario {
    Overheat,
    Tester,
    CommLoss,
}

impl Scenario {
    const ALL: [Scenario; 3] = [Scenario::Overheat, Scenario::Tester, Scenario::CommLoss];

    fn log_path(self) -> PathBuf {
        let name = match self {
            Scenario::Overheat => "emulator-overheat.log",
            Scenario::Tester => "emulator-tester.log",
            Scenario::CommLoss => "emulator-comm-loss.log",
        };
        PathBuf::from("transcripts").join(name)
    }

    fn commands(self) -> &'static [&'static str] {
        match self {
            // Sustained heat, the peer voltage confirms it, then the pair cools down.
            Scenario::Overheat => &[
                "status",
                "temp slave 30",
                "run 5000",
                "status",
                "temp slave 20",
                "run 21000",
                "status",
                "events master",
            ],
            Scenario::Tester => &[
                "buttons master both",
                "run 200",
                "buttons master none",
                "key master 1",
                "run 200",
                "key master 3",
                "run 1000",
                "key master 4",
                "run 400",
                "key master 6",
                "run 2400",
                "status",
            ],
            Scenario::CommLoss => &[
                "run 1000",
                "link down",
                "run 31000",
                "status",
                "link up",
                "run 2000",
                "status",
                "events slave",
            ],
        }
    }
}

fn main() -> io::Result<()> {
    for scenario in Scenario::ALL {
        record(scenario)?;
    }
    Ok(())
}

fn record(scenario: Scenario) -> io::Result<()> {
    let options = SessionOptions {
        transcript: Some(scenario.log_path()),
        ..SessionOptions::default()
    };
    let mut session = Session::new(&options)?;
    session.startup()?;
    for command in scenario.commands() {
        let _ = session.handle_command(command)?;
    }
    Ok(())
}

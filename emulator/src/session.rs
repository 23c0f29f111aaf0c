use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant as HostInstant};

use crossterm::style::{Color, Stylize, style};
use ecu_core::can::CanBus;
use ecu_core::can::mailbox::ObjectDef;
use ecu_core::can::protocol::{MASTER_OBJECTS, SLAVE_OBJECTS};
use ecu_core::config::{MasterConfig, SlaveConfig};
use ecu_core::node::master::{MasterEcu, MasterNode};
use ecu_core::node::slave::{SlaveEcu, SlaveNode};
use ecu_core::node::{Board, NodeCore};
use ecu_core::presentation::{Led, LedPanel, LedState};
use ecu_core::telemetry::{EventId, EventRecord};
use ecu_core::ticks::TickCounters;

use crate::grammar::{self, Command, Target};
use crate::host::{FileStorage, HostConsole, HostInputs, HostLeds, HostPlatform, VirtualBus};

pub const HELP_TOPICS: &[(&str, &str)] = &[
    (
        "run",
        "run <ticks>                        - advance both ECUs by <ticks> milliseconds",
    ),
    (
        "temp",
        "temp <ecu> <celsius>               - override a temperature reading (0-40)",
    ),
    (
        "volt",
        "volt <ecu> <volts>                 - override a voltage reading (0-3)",
    ),
    (
        "buttons",
        "buttons <ecu> none|left|right|both - hold buttons until changed",
    ),
    (
        "key",
        "key <ecu> <keys>                   - type on an ECU's diagnostic UART",
    ),
    (
        "link",
        "link up|down                       - connect or cut the CAN wire",
    ),
    (
        "status",
        "status                             - show state, DTC and LEDs of both ECUs",
    ),
    (
        "events",
        "events [ecu]                       - list retained node events",
    ),
    (
        "help",
        "help [topic]                       - show help for a command",
    ),
];

const TRANSCRIPT_HEADER: &str = "ECU pair emulator transcript";
const MASTER_STORAGE_FILE: &str = "ecu1.nv";
const SLAVE_STORAGE_FILE: &str = "ecu2.nv";

type HostMaster = MasterEcu<'static, HostPlatform>;
type HostSlave = SlaveEcu<'static, HostPlatform>;
type HostCore = NodeCore<'static, HostPlatform>;

#[derive(Clone, Debug, Default)]
pub struct SessionOptions {
    /// Append every command and reply to this file.
    pub transcript: Option<PathBuf>,
    /// Directory holding one storage file per ECU. In-memory when unset.
    pub storage: Option<PathBuf>,
    /// Colour LED states in replies. Transcripts are always plain.
    pub color: bool,
}

/// Both ECUs on one virtual wire, advanced together one tick at a time.
pub struct Session {
    master: HostMaster,
    slave: HostSlave,
    master_ticks: &'static TickCounters,
    slave_ticks: &'static TickCounters,
    link_up: bool,
    seen: [Option<EventId>; 2],
    pending: Vec<String>,
    color: bool,
    transcript: Option<TranscriptLogger>,
    started_at: HostInstant,
}

impl Session {
    /// Boots both ECUs. Boot output is held until [`Session::startup`].
    ///
    /// # Errors
    /// Fails when the transcript or a storage file cannot be opened.
    pub fn new(options: &SessionOptions) -> io::Result<Self> {
        let transcript = options
            .transcript
            .as_deref()
            .map(TranscriptLogger::new)
            .transpose()?;
        let (master_storage, slave_storage) = match &options.storage {
            Some(dir) => {
                fs::create_dir_all(dir)?;
                (
                    FileStorage::open(dir.join(MASTER_STORAGE_FILE))?,
                    FileStorage::open(dir.join(SLAVE_STORAGE_FILE))?,
                )
            }
            None => (FileStorage::in_memory(), FileStorage::in_memory()),
        };

        // Nodes borrow their tick source for as long as they run.
        let master_ticks: &'static TickCounters = Box::leak(Box::new(TickCounters::new()));
        let slave_ticks: &'static TickCounters = Box::leak(Box::new(TickCounters::new()));
        let master = MasterNode::new(
            board(&MASTER_OBJECTS, master_storage)?,
            master_ticks,
            MasterConfig::DEFAULT,
        )
        .into_ecu();
        let slave = SlaveNode::new(
            board(&SLAVE_OBJECTS, slave_storage)?,
            slave_ticks,
            SlaveConfig::DEFAULT,
        )
        .into_ecu();

        let mut session = Self {
            master,
            slave,
            master_ticks,
            slave_ticks,
            link_up: true,
            seen: [None; 2],
            pending: Vec::new(),
            color: options.color,
            transcript,
            started_at: HostInstant::now(),
        };
        session.collect();
        Ok(session)
    }

    /// Output produced while booting.
    ///
    /// # Errors
    /// Fails when the transcript cannot be written.
    pub fn startup(&mut self) -> io::Result<Vec<String>> {
        let elapsed = self.started_at.elapsed();
        let lines = std::mem::take(&mut self.pending);
        self.record_output(elapsed, &lines)?;
        Ok(lines)
    }

    /// Runs one console line and returns the reply.
    ///
    /// # Errors
    /// Fails when the transcript cannot be written.
    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        let elapsed = self.started_at.elapsed();
        if let Some(transcript) = &mut self.transcript {
            transcript.append_line(elapsed, TranscriptRole::Host, trimmed)?;
        }

        let reply = match grammar::parse(trimmed) {
            Ok(command) => self.execute(command),
            Err(error) => Reply::from_line(format!("ERR syntax {error}")),
        };
        self.record_output(elapsed, &reply.plain)?;
        Ok(reply.shown)
    }

    fn execute(&mut self, command: Command) -> Reply {
        match command {
            Command::Run(ticks) => self.handle_run(ticks),
            Command::Temperature(target, value) => {
                self.inputs(target).temperature = value;
                Reply::from_line(format!("{} temperature {value}C", target.label()))
            }
            Command::Voltage(target, value) => {
                self.inputs(target).voltage = value;
                Reply::from_line(format!("{} voltage {value}V", target.label()))
            }
            Command::Buttons(target, press) => {
                let (left, right) = press.levels();
                let inputs = self.inputs(target);
                inputs.left = left;
                inputs.right = right;
                Reply::from_line(format!(
                    "{} buttons left={} right={}",
                    target.label(),
                    u8::from(left),
                    u8::from(right)
                ))
            }
            Command::Keys(target, keys) => {
                self.console(target).type_keys(&keys);
                Reply::from_line(format!("{} queued {} byte(s)", target.label(), keys.len()))
            }
            Command::Link(up) => {
                self.link_up = up;
                Reply::from_line(format!("link {}", if up { "up" } else { "down" }))
            }
            Command::Status => self.handle_status(),
            Command::Events(target) => self.handle_events(target),
            Command::Help(topic) => handle_help(topic.as_deref()),
        }
    }

    fn handle_run(&mut self, ticks: u32) -> Reply {
        let before = [
            led_states(self.core(Target::Master).leds()),
            led_states(self.core(Target::Slave).leds()),
        ];

        for _ in 0..ticks {
            self.master_ticks.on_tick();
            self.slave_ticks.on_tick();
            self.master.run_pass();
            self.slave.run_pass();
            self.exchange();
            self.collect();
        }

        let mut reply = Reply::default();
        for line in std::mem::take(&mut self.pending) {
            reply.line(line);
        }
        for (target, before) in [Target::Master, Target::Slave].into_iter().zip(before) {
            let leds = self.core(target).leds();
            if led_states(leds) != before {
                self.push_leds(&mut reply, target);
            }
        }
        reply.line(format!(
            "ran {ticks} tick(s), now t={}",
            self.master_ticks.now()
        ));
        reply
    }

    fn handle_status(&self) -> Reply {
        let mut reply = Reply::default();
        let master = self.master.node();
        let slave = self.slave.node();

        reply.line(format!(
            "ECU1 state={} {}",
            master.state(),
            describe_core(master.core())
        ));
        let mirrored = slave
            .mirrored()
            .map_or_else(|| "-".to_string(), |state| state.to_string());
        let average = slave
            .latest_average()
            .map_or_else(|| "-".to_string(), |value| format!("{value}C"));
        reply.line(format!(
            "ECU2 mirrored={mirrored} average={average} fault={} {}",
            u8::from(slave.fault_state()),
            describe_core(slave.core())
        ));
        self.push_leds(&mut reply, Target::Master);
        self.push_leds(&mut reply, Target::Slave);
        reply.line(format!(
            "link {} t={}",
            if self.link_up { "up" } else { "down" },
            self.master_ticks.now()
        ));
        reply
    }

    fn handle_events(&self, target: Option<Target>) -> Reply {
        let targets = match target {
            Some(target) => vec![target],
            None => vec![Target::Master, Target::Slave],
        };
        let mut reply = Reply::default();
        for target in targets {
            let events = self.core(target).events();
            if events.is_empty() {
                reply.line(format!("{} no events", target.label()));
            }
            for record in events.oldest_first() {
                reply.line(describe_event(target, record));
            }
        }
        reply
    }

    fn push_leds(&self, reply: &mut Reply, target: Target) {
        let leds = self.core(target).leds();
        reply.styled(
            format!("{} leds {}", target.label(), led_summary(leds, false)),
            format!("{} leds {}", target.label(), led_summary(leds, self.color)),
        );
    }

    /// Carries frames across the wire. A cut wire drops them.
    fn exchange(&mut self) {
        let from_master = self.core_mut(Target::Master).bus_mut().take_outbox();
        let from_slave = self.core_mut(Target::Slave).bus_mut().take_outbox();
        if !self.link_up {
            return;
        }
        for frame in &from_master {
            self.core_mut(Target::Slave).bus_mut().deliver(frame);
        }
        for frame in &from_slave {
            self.core_mut(Target::Master).bus_mut().deliver(frame);
        }
    }

    /// Moves finished UART lines and new events into the pending output.
    fn collect(&mut self) {
        for (index, target) in [Target::Master, Target::Slave].into_iter().enumerate() {
            let lines = self.console(target).take_lines();
            self.pending.extend(
                lines
                    .into_iter()
                    .map(|line| format!("{}| {line}", target.label())),
            );

            let records: Vec<EventRecord> = self
                .core(target)
                .events()
                .newer_than(self.seen[index])
                .copied()
                .collect();
            if let Some(last) = records.last() {
                self.seen[index] = Some(last.id);
            }
            self.pending
                .extend(records.iter().map(|record| describe_event(target, record)));
        }
    }

    fn core(&self, target: Target) -> &HostCore {
        match target {
            Target::Master => self.master.node().core(),
            Target::Slave => self.slave.node().core(),
        }
    }

    fn core_mut(&mut self, target: Target) -> &mut HostCore {
        match target {
            Target::Master => self.master.node_mut().core_mut(),
            Target::Slave => self.slave.node_mut().core_mut(),
        }
    }

    fn inputs(&mut self, target: Target) -> &mut HostInputs {
        self.core_mut(target).inputs_mut()
    }

    fn console(&mut self, target: Target) -> &mut HostConsole {
        self.core_mut(target).console_mut()
    }

    fn record_output(&mut self, elapsed: Duration, lines: &[String]) -> io::Result<()> {
        if let Some(transcript) = &mut self.transcript {
            for line in lines {
                transcript.append_line(elapsed, TranscriptRole::Emulator, line)?;
            }
        }
        Ok(())
    }
}

/// Reply lines as logged and as shown on the terminal.
#[derive(Default)]
struct Reply {
    plain: Vec<String>,
    shown: Vec<String>,
}

impl Reply {
    fn from_line(line: String) -> Self {
        let mut reply = Self::default();
        reply.line(line);
        reply
    }

    fn line(&mut self, line: String) {
        self.shown.push(line.clone());
        self.plain.push(line);
    }

    fn styled(&mut self, plain: String, shown: String) {
        self.plain.push(plain);
        self.shown.push(shown);
    }
}

fn board(table: &[ObjectDef], storage: FileStorage) -> io::Result<Board<HostPlatform>> {
    let bus = VirtualBus::new(table).map_err(|error| io::Error::other(error.to_string()))?;
    Ok(Board {
        storage,
        bus,
        indicators: HostLeds,
        console: HostConsole::default(),
        inputs: HostInputs::default(),
    })
}

fn handle_help(topic: Option<&str>) -> Reply {
    let mut reply = Reply::default();
    match topic {
        Some(target) => {
            if let Some((_, detail)) = HELP_TOPICS
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(target))
            {
                reply.line((*detail).to_string());
            } else {
                reply.line(format!("No help available for `{target}`."));
                reply.line(format!("Available topics: {}", help_topic_list()));
            }
        }
        None => {
            reply.line("Available commands:".to_string());
            for (_, detail) in HELP_TOPICS {
                reply.line(format!("  {detail}"));
            }
            reply.line("ECUs are `master`/`ecu1`/`1` and `slave`/`ecu2`/`2`.".to_string());
            reply.line("Type `help <topic>` for a specific command.".to_string());
        }
    }
    reply
}

fn help_topic_list() -> String {
    HELP_TOPICS
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(", ")
}

fn describe_core(core: &HostCore) -> String {
    format!(
        "dtc={} can={} comm-indicator={} tester={} overruns={}",
        core.dtc().active(),
        on_off(core.bus().is_enabled()),
        on_off(core.comm_indicator()),
        on_off(core.tester_active()),
        core.bus().overruns()
    )
}

fn describe_event(target: Target, record: &EventRecord) -> String {
    format!(
        "{} [t={:>7}] {}",
        target.label(),
        record.tick,
        record.event
    )
}

fn on_off(flag: bool) -> &'static str {
    if flag { "on" } else { "off" }
}

fn led_states(leds: &LedPanel<HostLeds>) -> [LedState; 4] {
    Led::ALL.map(|led| leds.state(led))
}

fn led_summary(leds: &LedPanel<HostLeds>, styled: bool) -> String {
    Led::ALL
        .iter()
        .map(|&led| {
            let state = leds.state(led);
            let word = format!("{}={}", led.label(), state_label(state));
            if styled { paint(led, state, &word) } else { word }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn state_label(state: LedState) -> &'static str {
    match state {
        LedState::Off => "off",
        LedState::On => "on",
        LedState::Blink => "blink",
    }
}

fn paint(led: Led, state: LedState, word: &str) -> String {
    let color = match (led, state) {
        (_, LedState::Off) => Color::DarkGrey,
        (Led::Red, _) => Color::Red,
        (Led::Green, _) => Color::Green,
        (Led::Blue, _) => Color::Blue,
        (Led::White, _) => Color::White,
    };
    let content = style(word).with(color);
    if state == LedState::Blink {
        content.slow_blink().to_string()
    } else {
        content.to_string()
    }
}

struct TranscriptLogger {
    writer: BufWriter<std::fs::File>,
}

impl TranscriptLogger {
    fn new(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };

        logger.write_header()?;
        Ok(logger)
    }

    fn write_header(&mut self) -> io::Result<()> {
        writeln!(self.writer, "# {TRANSCRIPT_HEADER}")?;
        writeln!(
            self.writer,
            "# Timestamps are milliseconds since session start; ECU time is in ticks"
        )?;
        writeln!(self.writer)?;
        self.writer.flush()
    }

    fn append_line(
        &mut self,
        elapsed: Duration,
        role: TranscriptRole,
        line: &str,
    ) -> io::Result<()> {
        writeln!(
            self.writer,
            "[+{:>6} ms] {} {}",
            elapsed.as_millis(),
            role.prefix(),
            line
        )?;
        self.writer.flush()
    }
}

enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    fn prefix(&self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}

//! In-process ELM327 emulator
//!
//! Serves the adapter's command/response protocol over an in-memory duplex
//! stream so the channel, pipeline and session can run without hardware.
//! Replies can be scripted per command; unscripted data requests are served
//! by a simple drive-cycle simulator when enabled.

use crate::catalog::{self, Parameter};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::watch;
use tracing::{debug, trace};

/// ECU response header shown when headers are enabled
const ECU_HEADER: &str = "7E8";

/// What the emulator does with a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockReply {
    /// Reply with this text followed by the prompt
    Text(String),
    /// Never answer (the client times out)
    Silent,
    /// Close the connection
    Hangup,
}

/// Shared record of every command the emulator received, and of the client
/// closing its end
#[derive(Debug, Clone)]
pub struct CommandLog {
    commands: Arc<Mutex<Vec<String>>>,
    closed: Arc<watch::Sender<bool>>,
}

impl Default for CommandLog {
    fn default() -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            commands: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(closed),
        }
    }
}

impl CommandLog {
    fn push(&self, command: &str) {
        if let Ok(mut log) = self.commands.lock() {
            log.push(command.to_string());
        }
    }

    fn mark_closed(&self) {
        self.closed.send_replace(true);
    }

    /// Copy of all commands received so far
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().map(|log| log.clone()).unwrap_or_default()
    }

    /// Number of commands received so far
    pub fn len(&self) -> usize {
        self.commands.lock().map(|log| log.len()).unwrap_or(0)
    }

    /// True if nothing has been received
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the client shut down or dropped its end
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolves once the client has shut down or dropped its end
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        // The sender lives in `self`, so the channel cannot close under us
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

/// Adapter settings toggled by AT commands
#[derive(Debug, Clone)]
struct AdapterSettings {
    echo: bool,
    linefeeds: bool,
    headers: bool,
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            echo: true,
            linefeeds: true,
            headers: false,
        }
    }
}

impl AdapterSettings {
    fn line_ending(&self) -> &'static str {
        if self.linefeeds {
            "\r\n"
        } else {
            "\r"
        }
    }
}

/// Periodic drive cycle: cruise, full-throttle pull, coast
#[derive(Debug, Clone, Default)]
struct DriveSimulator {
    tick: u64,
}

impl DriveSimulator {
    const PERIOD: u64 = 300;

    /// Physical value for a parameter at the current tick
    fn value(&self, parameter: Parameter) -> f64 {
        let phase = self.tick % Self::PERIOD;
        let wobble = ((self.tick * 7919) % 11) as f64 - 5.0;
        match phase {
            // Steady cruise
            0..=149 => match parameter {
                Parameter::Rpm => 2200.0 + wobble * 10.0,
                Parameter::Speed => 65.0 + wobble * 0.2,
                Parameter::ThrottlePosition => 18.0,
                Parameter::EngineLoad => 30.0,
                Parameter::IntakePressure => 80.0,
                Parameter::CommandedAfr => 14.7,
                _ => self.ambient(parameter),
            },
            // Wide-open-throttle pull
            150..=199 => {
                let progress = (phase - 150) as f64 / 50.0;
                match parameter {
                    Parameter::Rpm => 3000.0 + progress * 3000.0,
                    Parameter::Speed => 70.0 + progress * 50.0,
                    Parameter::ThrottlePosition => 92.0,
                    Parameter::EngineLoad => 85.0,
                    Parameter::IntakePressure => 150.0 + progress * 80.0,
                    Parameter::CommandedAfr => 11.5,
                    Parameter::KnockRetard => 1.0,
                    Parameter::WastegateDuty => 60.0,
                    _ => self.ambient(parameter),
                }
            }
            // Closed-throttle coast
            _ => match parameter {
                Parameter::Rpm => 1600.0,
                Parameter::Speed => 90.0 - (phase - 200) as f64 * 0.4,
                Parameter::ThrottlePosition => 0.0,
                Parameter::EngineLoad => 10.0,
                Parameter::IntakePressure => 35.0,
                Parameter::CommandedAfr => 14.7,
                _ => self.ambient(parameter),
            },
        }
    }

    fn ambient(&self, parameter: Parameter) -> f64 {
        match parameter {
            Parameter::CoolantTemp => 90.0,
            Parameter::IntakeTemp => 32.0,
            Parameter::TimingAdvance => 12.0,
            Parameter::MafFlow => 25.0,
            Parameter::ShortFuelTrim | Parameter::LongFuelTrim => 0.0,
            Parameter::FuelPressure => 160.0,
            Parameter::VvtAngle => 20.0,
            _ => 0.0,
        }
    }
}

/// Inverse of the catalog decode rules, used to synthesise raw bytes
fn encode_raw(parameter: Parameter, value: f64) -> u32 {
    let raw = match parameter {
        Parameter::Rpm => value * 4.0,
        Parameter::EngineLoad | Parameter::ThrottlePosition => value * 255.0 / 100.0,
        Parameter::CoolantTemp | Parameter::IntakeTemp => value + 40.0,
        Parameter::TimingAdvance => (value + 64.0) * 2.0,
        Parameter::MafFlow => value * 100.0,
        Parameter::CommandedAfr => value / catalog::STOICH_AFR * 32768.0,
        Parameter::ShortFuelTrim | Parameter::LongFuelTrim => value * 128.0 / 100.0 + 128.0,
        _ => value,
    };
    raw.round().max(0.0) as u32
}

/// Scriptable ELM327 emulator
#[derive(Debug, Default)]
pub struct MockAdapter {
    settings: AdapterSettings,
    fixed: HashMap<String, MockReply>,
    queued: HashMap<String, VecDeque<MockReply>>,
    simulator: Option<DriveSimulator>,
    stored_dtcs: Vec<String>,
    log: CommandLog,
}

impl MockAdapter {
    /// Emulator that answers AT commands and reports `NO DATA` otherwise
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve unscripted data requests from the drive-cycle simulator
    pub fn with_simulator(mut self) -> Self {
        self.simulator = Some(DriveSimulator::default());
        self
    }

    /// Always answer `command` with `text`
    pub fn reply(mut self, command: &str, text: &str) -> Self {
        self.fixed
            .insert(command.to_ascii_uppercase(), MockReply::Text(text.to_string()));
        self
    }

    /// Always treat `command` with the given behaviour
    pub fn behave(mut self, command: &str, reply: MockReply) -> Self {
        self.fixed.insert(command.to_ascii_uppercase(), reply);
        self
    }

    /// Answer the next occurrence of `command` with `reply`, ahead of fixed replies
    pub fn reply_once(mut self, command: &str, reply: MockReply) -> Self {
        self.queued
            .entry(command.to_ascii_uppercase())
            .or_default()
            .push_back(reply);
        self
    }

    /// Stored trouble codes as 4-hex-digit groups (e.g. "0234")
    pub fn with_dtcs(mut self, codes: &[&str]) -> Self {
        self.stored_dtcs = codes.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Handle to the received-command log
    pub fn command_log(&self) -> CommandLog {
        self.log.clone()
    }

    /// Start serving on a background task and return the client end
    pub fn spawn(self) -> DuplexStream {
        let (client, server) = tokio::io::duplex(4096);
        tokio::spawn(self.serve(server));
        client
    }

    async fn serve(mut self, mut stream: DuplexStream) {
        let mut pending = Vec::new();
        let mut chunk = [0u8; 256];
        loop {
            let n = match stream.read(&mut chunk).await {
                Ok(0) | Err(_) => {
                    debug!("Mock adapter client closed the link");
                    self.log.mark_closed();
                    break;
                }
                Ok(n) => n,
            };
            pending.extend_from_slice(&chunk[..n]);

            while let Some(pos) = pending.iter().position(|b| *b == b'\r') {
                let line: Vec<u8> = pending.drain(..=pos).collect();
                let command = String::from_utf8_lossy(&line)
                    .trim()
                    .replace(' ', "")
                    .to_ascii_uppercase();
                if command.is_empty() {
                    continue;
                }
                self.log.push(&command);

                match self.respond(&command) {
                    MockReply::Text(text) => {
                        let mut out = String::new();
                        if self.settings.echo {
                            out.push_str(&command);
                            out.push('\r');
                        }
                        out.push_str(&text);
                        out.push_str(self.settings.line_ending());
                        out.push_str(self.settings.line_ending());
                        out.push('>');
                        trace!("Mock adapter reply to {}: {:?}", command, out);
                        if stream.write_all(out.as_bytes()).await.is_err() {
                            return;
                        }
                    }
                    MockReply::Silent => debug!("Mock adapter ignoring {}", command),
                    MockReply::Hangup => {
                        debug!("Mock adapter hanging up on {}", command);
                        return;
                    }
                }
            }
        }
    }

    fn respond(&mut self, command: &str) -> MockReply {
        if let Some(reply) = self.queued.get_mut(command).and_then(VecDeque::pop_front) {
            return reply;
        }
        if let Some(reply) = self.fixed.get(command) {
            return reply.clone();
        }
        if command.starts_with("AT") {
            return MockReply::Text(self.handle_at_command(command));
        }
        MockReply::Text(self.handle_request(command))
    }

    fn handle_at_command(&mut self, command: &str) -> String {
        match command {
            "ATZ" => {
                self.settings = AdapterSettings::default();
                "ELM327 v1.5".to_string()
            }
            "ATE0" => {
                self.settings.echo = false;
                "OK".to_string()
            }
            "ATE1" => {
                self.settings.echo = true;
                "OK".to_string()
            }
            "ATL0" => {
                self.settings.linefeeds = false;
                "OK".to_string()
            }
            "ATL1" => {
                self.settings.linefeeds = true;
                "OK".to_string()
            }
            "ATH0" => {
                self.settings.headers = false;
                "OK".to_string()
            }
            "ATH1" => {
                self.settings.headers = true;
                "OK".to_string()
            }
            cmd if cmd.starts_with("ATSP") => "OK".to_string(),
            _ => "?".to_string(),
        }
    }

    fn handle_request(&mut self, command: &str) -> String {
        match command {
            "03" => {
                if self.stored_dtcs.is_empty() {
                    "NO DATA".to_string()
                } else {
                    let body: Vec<String> = self
                        .stored_dtcs
                        .iter()
                        .map(|code| format!("{} {}", &code[..2], &code[2..]))
                        .collect();
                    self.with_header(&format!("43 {}", body.join(" ")))
                }
            }
            "04" => {
                self.stored_dtcs.clear();
                self.with_header("44")
            }
            _ => self.simulated_reading(command),
        }
    }

    fn simulated_reading(&mut self, command: &str) -> String {
        let (Some(definition), Some(simulator)) = (catalog::by_command(command), self.simulator.as_mut())
        else {
            return "NO DATA".to_string();
        };

        if definition.parameter == Parameter::Rpm {
            simulator.tick += 1;
        }
        let raw = encode_raw(definition.parameter, simulator.value(definition.parameter));

        let mode = u8::from_str_radix(&command[..2], 16).unwrap_or(0x01) + 0x40;
        let mut text = format!("{:02X} {}", mode, &command[2..]);
        for i in (0..definition.response_bytes).rev() {
            text.push_str(&format!(" {:02X}", (raw >> (8 * i)) & 0xFF));
        }
        self.with_header(&text)
    }

    fn with_header(&self, payload: &str) -> String {
        if self.settings.headers {
            let len = payload.split_whitespace().count();
            format!("{} {:02X} {}", ECU_HEADER, len, payload)
        } else {
            payload.to_string()
        }
    }
}

use std::cell::{Cell, RefCell};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use logger_core::button::{ButtonInput, ButtonState};
use logger_core::calibration::FlashCalibrationStore;
use logger_core::config::DeviceConfig;
use logger_core::console::{ConsoleCommand, ConsoleError, help_text, parse_command};
use logger_core::device::{Command, Device, DeviceParts};
use logger_core::flashfs::{MEM_ERASE_SIZE, MemFlash};
use logger_core::logger::{LogFileInfo, LogStorage};
use logger_core::record::RecordReader;
use logger_core::sensor::{Axes, ImuSample, STANDARD_GRAVITY, SensorProvider};
use logger_core::telemetry::EventId;
use logger_core::time::Millis;
use logger_core::tone::Buzzer;

/// Upper bound on how long `press` waits for the button to settle.
const SETTLE_LIMIT_MS: u32 = 1_000;

type CalibrationFlash = MemFlash<MEM_ERASE_SIZE>;
type EmulatedDevice =
    Device<SineImu, FlashCalibrationStore<CalibrationFlash>, SharedButton, ConsoleBuzzer, HostDirFs>;

/// Emulator options taken from the command line.
#[derive(Clone, Debug)]
pub struct SessionOptions {
    pub log_dir: PathBuf,
    pub sample_ms: Option<u32>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            sample_ms: None,
        }
    }
}

pub struct Session {
    device: EmulatedDevice,
    config: DeviceConfig,
    button: Rc<Cell<bool>>,
    tones: Rc<RefCell<Vec<String>>>,
    log_dir: PathBuf,
    now: Millis,
    cursor: EventId,
    transcript: TranscriptLogger,
}

impl Session {
    pub fn new(options: &SessionOptions) -> io::Result<Self> {
        fs::create_dir_all(&options.log_dir)?;
        let transcript = TranscriptLogger::new(&options.log_dir.join("console.log"))?;

        let mut config = DeviceConfig::DEFAULT;
        if let Some(interval) = options.sample_ms {
            config = config.with_sensor_interval(interval.max(1));
        }

        let button = Rc::new(Cell::new(false));
        let tones = Rc::new(RefCell::new(Vec::new()));
        let parts = DeviceParts {
            sensor: SineImu::default(),
            calibration: FlashCalibrationStore::at_end(CalibrationFlash::new()),
            button: SharedButton(Rc::clone(&button)),
            buzzer: ConsoleBuzzer(Rc::clone(&tones)),
            storage: HostDirFs::new(&options.log_dir),
        };
        let device = Device::new(parts, &config)
            .map_err(|err| io::Error::other(format!("device assembly failed: {err}")))?;

        Ok(Self {
            device,
            config,
            button,
            tones,
            log_dir: options.log_dir.clone(),
            now: Millis::ZERO,
            cursor: 0,
            transcript,
        })
    }

    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<String>> {
        let trimmed = line.trim();
        self.transcript
            .append_line(self.now, TranscriptRole::Host, trimmed)?;

        let lines = match parse_command(trimmed) {
            Ok(command) => self.execute(command),
            Err(ConsoleError::Empty) => Vec::new(),
            Err(err) => vec![format!("ERR {err}")],
        };

        for line in &lines {
            self.transcript
                .append_line(self.now, TranscriptRole::Emulator, line)?;
        }
        Ok(lines)
    }

    /// Flushes the active session before the emulator exits.
    pub fn shutdown(&mut self) -> io::Result<Vec<String>> {
        self.device.suspend(self.now);
        let lines = self.drain_journal();
        for line in &lines {
            self.transcript
                .append_line(self.now, TranscriptRole::Emulator, line)?;
        }
        Ok(lines)
    }

    fn execute(&mut self, command: ConsoleCommand<'_>) -> Vec<String> {
        match command {
            ConsoleCommand::Press(duration) => {
                self.button.set(true);
                self.advance(duration);
                self.button.set(false);
                self.settle();
                self.drain_journal()
            }
            ConsoleCommand::Wait(duration) => {
                self.advance(duration);
                self.drain_journal()
            }
            ConsoleCommand::Calibrate => {
                self.device.command(Command::StartCalibration, self.now);
                self.drain_journal()
            }
            ConsoleCommand::Status => self.status(),
            ConsoleCommand::Files => self.files(),
            ConsoleCommand::Dump(name) => self.dump(name),
            ConsoleCommand::Remove(name) => match self.device.tasks_mut().logger.delete_file(name)
            {
                Ok(()) => vec![format!("removed {name}")],
                Err(fault) => vec![format!("ERR {fault}")],
            },
            ConsoleCommand::Journal => self.drain_journal(),
            ConsoleCommand::Help(topic) => match help_text(topic) {
                Some(text) => vec![text.to_string()],
                None => vec![
                    format!("No help available for `{}`.", topic.unwrap_or_default()),
                    help_text(None).unwrap_or_default().to_string(),
                ],
            },
        }
    }

    /// Steps the simulated clock one millisecond at a time.
    fn advance(&mut self, duration_ms: u32) {
        for _ in 0..duration_ms {
            self.now = self.now.wrapping_add(1);
            self.device.tick(self.now);
        }
    }

    /// Runs the device until the button returns to idle.
    fn settle(&mut self) {
        let step = self.config.button.sample_interval_ms();
        let mut waited = 0;
        while self.device.button_state() != ButtonState::Idle && waited < SETTLE_LIMIT_MS {
            self.advance(step);
            waited += step;
        }
    }

    fn status(&self) -> Vec<String> {
        let stats = self.device.log_stats();
        let mut lines = vec![format!("time: {}", self.now)];
        match self.device.current_file_name() {
            Some(name) if self.device.is_recording() => {
                lines.push(format!("recording: {name}"));
            }
            _ => lines.push("recording: idle".to_string()),
        }
        lines.push(format!("button: {}", self.device.button_state()));
        match self.device.active_tone() {
            Some(pattern) => lines.push(format!("tone: {pattern}")),
            None => lines.push("tone: silent".to_string()),
        }
        let calibration = if self.device.is_calibrating() {
            "running"
        } else if self.device.is_calibrated() {
            "applied"
        } else {
            "none"
        };
        lines.push(format!("calibration: {calibration}"));
        lines.push(format!(
            "records: written={} failed={} evicted={} rejected={} discarded={} buffered={}",
            stats.written,
            stats.write_failures,
            stats.evicted,
            stats.rejected,
            stats.discarded,
            self.device.tasks().logger.buffered(),
        ));
        lines.push(format!(
            "inhibited: {}",
            self.device.scheduler().pending_mask()
        ));
        if let Some(reading) = self.device.latest_reading() {
            lines.push(format!(
                "latest: accel=({:.3}, {:.3}, {:.3})g rates=({:.2}, {:.2}, {:.2})dps",
                reading.accel_g.x,
                reading.accel_g.y,
                reading.accel_g.z,
                reading.yaw,
                reading.pitch,
                reading.roll,
            ));
        }
        lines.extend(self.tones.borrow_mut().drain(..));
        lines
    }

    fn files(&mut self) -> Vec<String> {
        let mut listing: Vec<LogFileInfo> = Vec::new();
        if let Err(fault) = self
            .device
            .tasks_mut()
            .logger
            .list_files(|info| listing.push(info))
        {
            return vec![format!("ERR {fault}")];
        }
        if listing.is_empty() {
            return vec!["no log files".to_string()];
        }
        listing.sort_by_key(|info| info.number);
        listing
            .iter()
            .map(|info| format!("{:<16} {:>8} bytes", info.name, info.size))
            .collect()
    }

    fn dump(&self, name: &str) -> Vec<String> {
        let path = self.log_dir.join(name.trim_start_matches('/'));
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) => return vec![format!("ERR {}: {err}", path.display())],
        };

        let mut reader = RecordReader::new(&bytes);
        let mut lines: Vec<String> = reader
            .by_ref()
            .map(|record| {
                format!(
                    "{:>10} a=({:.3}, {:.3}, {:.3}) ypr=({:.2}, {:.2}, {:.2}) flags={:#04x}",
                    record.timestamp,
                    record.accel_x,
                    record.accel_y,
                    record.accel_z,
                    record.yaw,
                    record.pitch,
                    record.roll,
                    record.flags,
                )
            })
            .collect();
        lines.push(format!("{} records", lines.len()));
        let trailing = reader.remainder().len();
        if trailing > 0 {
            lines.push(format!("{trailing} trailing bytes ignored"));
        }
        lines
    }

    fn drain_journal(&mut self) -> Vec<String> {
        let journal = self.device.journal();
        let mut lines: Vec<String> = journal
            .since(self.cursor)
            .map(ToString::to_string)
            .collect();
        self.cursor = journal.next_id();
        lines.extend(self.tones.borrow_mut().drain(..));
        lines
    }
}

/// Button level shared with the console.
struct SharedButton(Rc<Cell<bool>>);

impl ButtonInput for SharedButton {
    fn is_pressed(&mut self) -> bool {
        self.0.get()
    }
}

/// Buzzer that narrates frequency changes.
struct ConsoleBuzzer(Rc<RefCell<Vec<String>>>);

impl Buzzer for ConsoleBuzzer {
    fn start(&mut self, frequency_hz: u32) {
        self.0.borrow_mut().push(format!("buzzer: {frequency_hz} Hz"));
    }

    fn stop(&mut self) {
        self.0.borrow_mut().push("buzzer: off".to_string());
    }
}

/// IMU that sways slowly around level.
#[derive(Default)]
struct SineImu {
    step: u32,
}

impl SensorProvider for SineImu {
    fn read(&mut self) -> Option<ImuSample> {
        let phase = f64::from(self.step) * 0.05;
        self.step = self.step.wrapping_add(1);
        #[allow(clippy::cast_possible_truncation)]
        let (sin, cos) = (phase.sin() as f32, phase.cos() as f32);
        Some(ImuSample {
            accel: Axes::new(0.3 * sin, 0.2 * cos, STANDARD_GRAVITY),
            gyro: Axes::new(0.05 * cos, 0.01, -0.05 * sin),
        })
    }
}

/// Log storage backed by a host directory, one file per log.
struct HostDirFs {
    root: PathBuf,
}

impl HostDirFs {
    fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.join(name.trim_start_matches('/'))
    }
}

impl LogStorage for HostDirFs {
    type Handle = File;
    type Error = io::Error;

    fn open_append(&mut self, name: &str) -> io::Result<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(name))
    }

    fn write(&mut self, handle: &mut File, bytes: &[u8]) -> io::Result<()> {
        handle.write_all(bytes)
    }

    fn sync(&mut self, handle: &mut File) -> io::Result<()> {
        handle.sync_data()
    }

    fn close(&mut self, handle: File) -> io::Result<()> {
        handle.sync_all()
    }

    fn visit(&mut self, visitor: &mut dyn FnMut(&str, u32)) -> io::Result<()> {
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                visitor(name, u32::try_from(metadata.len()).unwrap_or(u32::MAX));
            }
        }
        Ok(())
    }

    fn remove(&mut self, name: &str) -> io::Result<()> {
        fs::remove_file(self.path(name))
    }
}

struct TranscriptLogger {
    writer: BufWriter<File>,
}

impl TranscriptLogger {
    fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };
        writeln!(logger.writer, "# Motion logger emulator transcript")?;
        writeln!(logger.writer, "# Timestamps are simulated device milliseconds")?;
        writeln!(logger.writer)?;
        logger.writer.flush()?;
        Ok(logger)
    }

    fn append_line(&mut self, now: Millis, role: TranscriptRole, line: &str) -> io::Result<()> {
        writeln!(
            self.writer,
            "[{:>8} ms] {} {}",
            now.as_u32(),
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

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "logger-emulator-{tag}-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn session(tag: &str) -> (Session, PathBuf) {
        let dir = scratch_dir(tag);
        let options = SessionOptions {
            log_dir: dir.clone(),
            sample_ms: None,
        };
        (Session::new(&options).expect("session"), dir)
    }

    #[test]
    fn short_presses_record_a_file() {
        let (mut session, dir) = session("record");

        let started = session.handle_command("press 100ms").expect("press");
        assert!(started.iter().any(|line| line.contains("short-press")));
        assert!(session.device.is_recording());

        session.handle_command("wait 2s").expect("wait");
        session.handle_command("press 100").expect("press");
        assert!(!session.device.is_recording());

        let files = session.handle_command("files").expect("files");
        assert_eq!(files.len(), 1);
        assert!(files[0].starts_with("mpulog1.bin"));

        let dump = session.handle_command("dump mpulog1.bin").expect("dump");
        let summary = dump.last().expect("summary");
        assert!(summary.ends_with("records"));
        assert!(dump.len() > 10);

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn files_keep_their_stored_names() {
        let (mut session, dir) = session("padded");
        fs::write(dir.join("mpulog007.bin"), [0u8; 32]).expect("seed file");

        let files = session.handle_command("files").expect("files");
        assert_eq!(files.len(), 1);
        assert!(files[0].starts_with("mpulog007.bin"), "{files:?}");

        let removed = session.handle_command("rm mpulog007.bin").expect("rm");
        assert_eq!(removed, vec!["removed mpulog007.bin".to_string()]);
        assert!(!dir.join("mpulog007.bin").exists());

        let missing = session.handle_command("rm mpulog7.bin").expect("rm");
        assert_eq!(missing, vec!["ERR no such file".to_string()]);

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn syntax_errors_are_reported() {
        let (mut session, dir) = session("syntax");
        let lines = session.handle_command("press soon").expect("command");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("ERR syntax error"));
        assert!(session.handle_command("   ").expect("blank").is_empty());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn help_falls_back_to_summary() {
        let (mut session, dir) = session("help");
        let lines = session.handle_command("help nothing").expect("help");
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("nothing"));
        let _ = fs::remove_dir_all(dir);
    }
}

//! Tesseract OCR engine (CLI wrapper)
//!
//! The image is streamed to `tesseract stdin stdout ... tsv` over a pipe, so
//! no image data ever touches the filesystem.

use image::{DynamicImage, ImageFormat};
use std::io::{Cursor, Read, Write};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::engine::OcrEngine;
use crate::types::{EngineInfo, OcrWord, TesseractConfig, WordBox};
use crate::OcrError;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Tesseract OCR engine
pub struct TesseractEngine {
    config: TesseractConfig,
    version: String,
}

impl TesseractEngine {
    /// Probes the binary; fails with `Unavailable` if it cannot be run.
    pub fn new(config: TesseractConfig) -> Result<Self, OcrError> {
        let version = get_tesseract_version(config.binary_or_default())?;
        log::info!(
            "[Tesseract] ready, version {} (lang {})",
            version,
            config.lang_or_default()
        );
        Ok(Self { config, version })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn languages(&self) -> Vec<String> {
        get_tesseract_langs(
            self.config.binary_or_default(),
            self.config.tessdata_path.as_deref(),
        )
        .unwrap_or_default()
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(self.config.binary_or_default());
        cmd.arg("stdin")
            .arg("stdout")
            .arg("-l")
            .arg(self.config.lang_or_default())
            .arg("--psm")
            .arg(self.config.psm_or_default().to_string())
            .arg("--oem")
            .arg(self.config.oem_or_default().to_string())
            .arg("tsv");
        if let Some(tessdata_path) = &self.config.tessdata_path {
            cmd.env("TESSDATA_PREFIX", tessdata_path);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

impl OcrEngine for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn recognize(
        &self,
        image: &DynamicImage,
        deadline: Instant,
        cancel: &AtomicBool,
    ) -> Result<Vec<OcrWord>, OcrError> {
        let start = Instant::now();

        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| OcrError::ImageProcess(e.to_string()))?;

        let mut child = self
            .command()
            .spawn()
            .map_err(|e| OcrError::Unavailable(format!("failed to start tesseract: {}", e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| OcrError::Engine("stdin not captured".to_string()))?;
        let writer = thread::spawn(move || {
            let result = stdin.write_all(&png);
            drop(stdin);
            result
        });
        let stdout_reader = spawn_reader(child.stdout.take());
        let stderr_reader = spawn_reader(child.stderr.take());

        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if cancel.load(Ordering::Relaxed) {
                terminate(&mut child);
                return Err(OcrError::Cancelled);
            }
            if Instant::now() >= deadline {
                terminate(&mut child);
                log::warn!("[Tesseract] killed after {} ms", start.elapsed().as_millis());
                return Err(OcrError::Timeout(start.elapsed().as_millis()));
            }
            thread::sleep(POLL_INTERVAL);
        };

        // A broken pipe here only means tesseract stopped reading early;
        // the exit status below decides success.
        if let Ok(Err(e)) = writer.join() {
            log::debug!("[Tesseract] stdin write ended early: {}", e);
        }
        let stdout = join_reader(stdout_reader)?;
        let stderr = join_reader(stderr_reader)?;

        if !status.success() {
            let reason = stderr.lines().last().unwrap_or("").trim().to_string();
            return Err(OcrError::Engine(format!("tesseract exited with {}: {}", status, reason)));
        }

        let words = parse_tesseract_tsv(&stdout);
        log::info!(
            "[Tesseract] recognized {} word(s) in {} ms",
            words.len(),
            start.elapsed().as_millis()
        );
        Ok(words)
    }

    fn info(&self) -> EngineInfo {
        let params = serde_json::json!({
            "lang": self.config.lang_or_default(),
            "psm": self.config.psm_or_default(),
            "oem": self.config.oem_or_default(),
        });
        EngineInfo {
            name: self.name().to_string(),
            version: Some(self.version.clone()),
            params: Some(params.to_string()),
        }
    }
}

fn spawn_reader<R: Read + Send + 'static>(
    pipe: Option<R>,
) -> thread::JoinHandle<std::io::Result<String>> {
    thread::spawn(move || {
        let mut out = String::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_string(&mut out)?;
        }
        Ok(out)
    })
}

fn join_reader(handle: thread::JoinHandle<std::io::Result<String>>) -> Result<String, OcrError> {
    handle
        .join()
        .map_err(|_| OcrError::Engine("output reader panicked".to_string()))?
        .map_err(OcrError::from)
}

fn terminate(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Parses Tesseract TSV output.
///
/// Columns:
/// level page_num block_num par_num line_num word_num left top width height conf text
///
/// Only word rows (level 5) with text and a non-negative confidence are kept.
pub(crate) fn parse_tesseract_tsv(tsv: &str) -> Vec<OcrWord> {
    let mut words = Vec::new();

    for line in tsv.lines().skip(1) {
        let cols: Vec<&str> = line.split('\t').collect();
        if cols.len() < 12 {
            continue;
        }

        let level: i32 = cols[0].parse().unwrap_or(-1);
        let conf: f32 = cols[10].parse().unwrap_or(-1.0);
        let text = cols[11].trim();
        if level != 5 || text.is_empty() || conf < 0.0 {
            continue;
        }

        let num = |i: usize| cols[i].parse::<u32>().unwrap_or(0);
        words.push(OcrWord {
            text: text.to_string(),
            confidence: (conf / 100.0).clamp(0.0, 1.0),
            bbox: WordBox {
                left: num(6),
                top: num(7),
                width: num(8),
                height: num(9),
            },
            line: (num(2), num(3), num(4)),
        });
    }

    words
}

/// Returns the Tesseract version, e.g. "5.3.0".
pub fn get_tesseract_version(binary_path: &str) -> Result<String, OcrError> {
    let output = Command::new(binary_path)
        .arg("--version")
        .output()
        .map_err(|e| OcrError::Unavailable(format!("cannot run {}: {}", binary_path, e)))?;

    if !output.status.success() {
        return Err(OcrError::Unavailable(format!(
            "{} --version exited with {}",
            binary_path, output.status
        )));
    }

    let combined = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );

    for line in combined.lines() {
        if line.contains("tesseract") {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() >= 2 {
                return Ok(parts[1].trim_start_matches('v').to_string());
            }
        }
    }

    Ok("unknown".to_string())
}

/// Lists installed language packs.
pub fn get_tesseract_langs(
    binary_path: &str,
    tessdata_path: Option<&str>,
) -> Result<Vec<String>, OcrError> {
    let mut cmd = Command::new(binary_path);
    cmd.arg("--list-langs");
    if let Some(path) = tessdata_path {
        cmd.env("TESSDATA_PREFIX", path);
    }

    let output = cmd
        .output()
        .map_err(|e| OcrError::Unavailable(e.to_string()))?;
    let combined = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );

    let mut langs = Vec::new();
    let mut found_list = false;
    for line in combined.lines() {
        let line = line.trim();
        if line.contains("List of available languages") {
            found_list = true;
            continue;
        }
        if found_list && !line.is_empty() && !line.contains(':') {
            langs.push(line.to_string());
        }
    }
    Ok(langs)
}

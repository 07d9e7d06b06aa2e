//! [`RecognitionEngine`] backed by the `tesseract` command-line program.
//!
//! The page is piped in as PNG and Tesseract's TSV report is read back:
//!
//! ```text
//! level page_num block_num par_num line_num word_num left top width height conf text
//! 5     1        1         1       1        1        36   92  60    18     96.1 HELLO
//! ```
//!
//! Level-5 rows are words. A confidence of `-1` means "no score" and is
//! kept as `None`. Text is rebuilt from the words: spaces within a line,
//! newlines between lines and a blank line between paragraphs.

use crate::error::CollaboratorError;
use crate::page::PageImage;
use crate::pipeline::encode::encode_png;
use crate::recognize::{BoundingBox, RawRecognition, RawWord, RecognitionEngine, SegmentationMode};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::debug;

/// Runs `tesseract stdin stdout -l <lang> --psm <mode> tsv` per page.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    binary: PathBuf,
    dpi: Option<u32>,
    extra_args: Vec<String>,
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("tesseract"),
            dpi: None,
            extra_args: Vec::new(),
        }
    }
}

impl TesseractEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific `tesseract` executable.
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Resolution hint for pages that carry no DPI of their own.
    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = Some(dpi);
        self
    }

    /// Extra arguments placed before the output format (e.g. `--oem 1`).
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Build the invocation; `dpi` is the page's own resolution, if known.
    fn command(&self, language: &str, mode: SegmentationMode, dpi: Option<u32>) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("stdin")
            .arg("stdout")
            .arg("-l")
            .arg(language)
            .arg("--psm")
            .arg(mode.as_psm().to_string());
        if let Some(dpi) = dpi.or(self.dpi) {
            cmd.arg("--dpi").arg(dpi.to_string());
        }
        cmd.args(&self.extra_args).arg("tsv");
        cmd
    }
}

impl RecognitionEngine for TesseractEngine {
    fn recognize_raw(
        &self,
        image: &PageImage,
        language: &str,
        mode: SegmentationMode,
    ) -> Result<RawRecognition, CollaboratorError> {
        let png = encode_png(image)
            .map_err(|e| CollaboratorError::new(format!("PNG encoding failed: {e}")))?;

        let mut child = self
            .command(language, mode, image.dpi())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                CollaboratorError::new(format!("cannot start {}: {e}", self.binary.display()))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| CollaboratorError::new("tesseract stdin unavailable"))?;
        let writer = std::thread::spawn(move || stdin.write_all(&png));

        let output = child
            .wait_with_output()
            .map_err(|e| CollaboratorError::new(format!("tesseract did not finish: {e}")))?;

        let written = writer.join();

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CollaboratorError::new(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        match written {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(CollaboratorError::new(format!("writing page to tesseract failed: {e}")))
            }
            Err(_) => return Err(CollaboratorError::new("tesseract stdin writer panicked")),
        }

        let tsv = String::from_utf8_lossy(&output.stdout);
        let raw = parse_tsv(&tsv)?;
        debug!(words = raw.words.len(), "Parsed tesseract TSV");
        Ok(raw)
    }

    fn name(&self) -> &str {
        "tesseract"
    }
}

/// Parse Tesseract's TSV output.
pub fn parse_tsv(tsv: &str) -> Result<RawRecognition, CollaboratorError> {
    let mut lines = tsv.lines();
    match lines.next() {
        Some(header) if header.starts_with("level") => {}
        Some(other) => {
            return Err(CollaboratorError::new(format!(
                "unexpected TSV header: {other:?}"
            )))
        }
        None => return Ok(RawRecognition::default()),
    }

    let mut words = Vec::new();
    let mut text = String::new();
    let mut last_par: Option<(u32, u32)> = None;
    let mut last_line: Option<(u32, u32, u32)> = None;

    for (n, row) in lines.enumerate() {
        if row.trim().is_empty() {
            continue;
        }
        let cols: Vec<&str> = row.splitn(12, '\t').collect();
        if cols.len() < 11 {
            return Err(CollaboratorError::new(format!(
                "TSV row {} has {} columns",
                n + 2,
                cols.len()
            )));
        }
        if cols[0] != "5" {
            continue;
        }
        let word_text = cols.get(11).map(|t| t.trim()).unwrap_or("");
        if word_text.is_empty() {
            continue;
        }

        let num = |i: usize| -> Result<u32, CollaboratorError> {
            cols[i].trim().parse::<u32>().map_err(|_| {
                CollaboratorError::new(format!("TSV row {}: bad number {:?}", n + 2, cols[i]))
            })
        };
        let block = num(2)?;
        let par = num(3)?;
        let line = num(4)?;

        let par_key = (block, par);
        let line_key = (block, par, line);
        if last_par.is_some_and(|p| p != par_key) {
            text.push_str("\n\n");
        } else if last_line.is_some_and(|l| l != line_key) {
            text.push('\n');
        } else if last_line.is_some() {
            text.push(' ');
        }
        text.push_str(word_text);
        last_par = Some(par_key);
        last_line = Some(line_key);

        let confidence = cols[10]
            .trim()
            .parse::<f32>()
            .ok()
            .filter(|c| *c >= 0.0);

        words.push(RawWord {
            text: word_text.to_string(),
            confidence,
            bbox: Some(BoundingBox {
                left: num(6)?,
                top: num(7)?,
                width: num(8)?,
                height: num(9)?,
            }),
        });
    }

    Ok(RawRecognition { text, words })
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    fn row(level: u8, block: u32, par: u32, line: u32, word: u32, conf: &str, text: &str) -> String {
        format!("{level}\t1\t{block}\t{par}\t{line}\t{word}\t10\t20\t30\t40\t{conf}\t{text}")
    }

    #[test]
    fn parses_words_lines_and_paragraphs() {
        let tsv = [
            HEADER.to_string(),
            row(1, 0, 0, 0, 0, "-1", ""),
            row(5, 1, 1, 1, 1, "96.5", "HELLO"),
            row(5, 1, 1, 1, 2, "91", "WORLD"),
            row(5, 1, 1, 2, 1, "88", "next"),
            row(5, 1, 2, 1, 1, "-1", "para"),
        ]
        .join("\n");

        let raw = parse_tsv(&tsv).expect("parse");
        assert_eq!(raw.text, "HELLO WORLD\nnext\n\npara");
        assert_eq!(raw.words.len(), 4);
        assert_eq!(raw.words[0].confidence, Some(96.5));
        assert_eq!(raw.words[3].confidence, None);
        assert_eq!(
            raw.words[1].bbox,
            Some(BoundingBox {
                left: 10,
                top: 20,
                width: 30,
                height: 40
            })
        );
    }

    #[test]
    fn header_only_is_empty() {
        let raw = parse_tsv(HEADER).expect("parse");
        assert!(raw.text.is_empty());
        assert!(raw.words.is_empty());
    }

    #[test]
    fn empty_output_is_empty() {
        assert_eq!(parse_tsv("").expect("parse"), RawRecognition::default());
    }

    #[test]
    fn blank_word_rows_are_skipped() {
        let tsv = [HEADER.to_string(), row(5, 1, 1, 1, 1, "95", "  ")].join("\n");
        assert!(parse_tsv(&tsv).expect("parse").words.is_empty());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_tsv("Error opening data file").is_err());
        let tsv = format!("{HEADER}\n5\t1\t1");
        assert!(parse_tsv(&tsv).is_err());
    }

    #[test]
    fn command_line_layout() {
        let engine = TesseractEngine::new().with_dpi(300).with_args(["--oem", "1"]);
        let cmd = engine.command("spa", SegmentationMode::SingleBlock, None);
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec!["stdin", "stdout", "-l", "spa", "--psm", "6", "--dpi", "300", "--oem", "1", "tsv"]
        );
    }

    #[test]
    fn page_resolution_overrides_engine_default() {
        let engine = TesseractEngine::new().with_dpi(300);
        let cmd = engine.command("eng", SegmentationMode::Auto, Some(450));
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        let dpi_at = args.iter().position(|a| a == "--dpi").expect("--dpi flag");
        assert_eq!(args[dpi_at + 1], "450");
        assert_eq!(args.iter().filter(|a| *a == "--dpi").count(), 1);
    }

    #[test]
    fn missing_binary_is_a_collaborator_error() {
        let engine = TesseractEngine::new().with_binary("/nonexistent/tesseract-bin");
        let page = PageImage::from_gray(image::GrayImage::new(4, 4));
        let err = engine
            .recognize_raw(&page, "eng", SegmentationMode::Auto)
            .unwrap_err();
        assert!(err.message.contains("cannot start"));
    }
}

//! Tesseract CLI wrapper.

use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;
use std::time::Instant;

use doctriage_core::{NoOcr, OcrError, TextRecognizer};
use image::DynamicImage;

const DEFAULT_PSM: u8 = 6;

#[derive(Debug, Clone)]
pub struct TesseractCli {
    binary: PathBuf,
    lang: String,
    psm: u8,
}

impl TesseractCli {
    /// Resolve `command` on `PATH` (or as a path) and keep it for later runs.
    pub fn locate(command: &str, lang: &str) -> Result<Self, OcrError> {
        let binary = which::which(command)
            .map_err(|e| OcrError::Unavailable(format!("{command}: {e}")))?;

        Ok(Self {
            binary,
            lang: lang.to_string(),
            psm: DEFAULT_PSM,
        })
    }

    fn command(&self, image_path: &std::path::Path) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg(image_path)
            .arg("stdout")
            .arg("-l")
            .arg(&self.lang)
            .arg("--psm")
            .arg(self.psm.to_string());
        cmd
    }
}

impl TextRecognizer for TesseractCli {
    fn text_for(&self, image: &DynamicImage) -> Result<String, OcrError> {
        let start = Instant::now();

        // Removed when dropped.
        let input = tempfile::Builder::new()
            .prefix("doctriage-ocr-")
            .suffix(".png")
            .tempfile()?;
        image
            .save_with_format(input.path(), image::ImageFormat::Png)
            .map_err(|e| OcrError::Failed(format!("cannot write page image: {e}")))?;

        let output = self.command(input.path()).output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::Failed(stderr.trim().to_string()));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        log::debug!(
            "tesseract read {} chars in {} ms",
            text.chars().count(),
            start.elapsed().as_millis()
        );
        Ok(text)
    }
}

/// Tesseract when it can be found, otherwise a recognizer that reads nothing.
pub fn recognizer(command: &str, lang: &str, disabled: bool) -> Arc<dyn TextRecognizer> {
    if disabled {
        return Arc::new(NoOcr);
    }
    match TesseractCli::locate(command, lang) {
        Ok(tesseract) => {
            log::info!("Using OCR engine {}", tesseract.binary.display());
            Arc::new(tesseract)
        }
        Err(err) => {
            log::warn!("{err}; pages without a text layer will read as empty");
            Arc::new(NoOcr)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn test_missing_binary_is_unavailable() {
        let err = TesseractCli::locate("doctriage-no-such-ocr-binary", "eng").unwrap_err();
        assert!(matches!(err, OcrError::Unavailable(_)));
    }

    #[test]
    fn test_recognizer_falls_back_to_no_ocr() {
        let ocr = recognizer("doctriage-no-such-ocr-binary", "eng", false);
        let image = DynamicImage::ImageLuma8(GrayImage::from_pixel(4, 4, Luma([255])));
        assert_eq!(ocr.text_for(&image).unwrap(), "");
    }

    #[test]
    fn test_command_arguments() {
        let tesseract = TesseractCli {
            binary: PathBuf::from("/usr/bin/tesseract"),
            lang: "eng+fra".into(),
            psm: DEFAULT_PSM,
        };
        let cmd = tesseract.command(std::path::Path::new("/tmp/page.png"));
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().to_string()).collect();
        assert_eq!(args, ["/tmp/page.png", "stdout", "-l", "eng+fra", "--psm", "6"]);
    }
}

//! Everything one invocation needs to load and analyze documents.

use std::sync::Arc;

use chrono::Datelike;
use doctriage_core::{
    AnalysisContext, Document, HintsAggregate, LoadError, TextRecognizer, ToolRequest,
    TriageConfig,
};

use crate::prelude::*;

/// Read the config file named in `global` (if any) and apply flag overrides.
pub fn load_config(global: &crate::Global) -> Result<TriageConfig> {
    let mut config = match &global.config {
        Some(path) => {
            let source = std::fs::read_to_string(path).map_err(|source| Error::ConfigFile {
                path: path.clone(),
                source,
            })?;
            log::debug!("Loaded configuration from {}", path.display());
            TriageConfig::from_toml_str(&source).map_err(Error::from)?
        }
        None => TriageConfig::default(),
    };

    if let Some(dpi) = global.dpi {
        config.loader.dpi = dpi;
    }
    if let Some(timeout_ms) = global.timeout_ms {
        config.dispatcher.timeout_ms = Some(timeout_ms);
    }
    config.validate().map_err(Error::from)?;

    Ok(config)
}

pub struct Session {
    pub verbose: bool,
    pub ctx: Arc<AnalysisContext>,
    ocr: Arc<dyn TextRecognizer>,
    client: reqwest::Client,
}

impl Session {
    pub fn new(config: TriageConfig, ocr: Arc<dyn TextRecognizer>, verbose: bool) -> Self {
        let year = chrono::Local::now().year();
        Self {
            verbose,
            ctx: Arc::new(AnalysisContext::new(config, year)),
            ocr,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_global(global: &crate::Global) -> Result<Self> {
        let config = load_config(global)?;
        let ocr = crate::ocr::recognizer(&global.tesseract, &global.ocr_lang, global.no_ocr);
        Ok(Self::new(config, ocr, global.verbose))
    }

    pub async fn load(&self, reference: &str) -> Result<Arc<Document>, LoadError> {
        let document = crate::loader::load(
            &self.client,
            reference,
            &self.ctx.config.loader,
            Arc::clone(&self.ocr),
        )
        .await?;
        Ok(Arc::new(document))
    }

    /// Load `reference` once and run the requested tools on it.
    pub async fn analyze(
        &self,
        reference: &str,
        requests: Vec<ToolRequest>,
    ) -> Result<HintsAggregate, LoadError> {
        let document = self.load(reference).await?;
        let aggregate = crate::dispatch::run(document, requests, Arc::clone(&self.ctx)).await;
        log::info!(
            "{reference}: {} tool(s) succeeded, {} failed",
            aggregate.succeeded(),
            aggregate.failed()
        );
        Ok(aggregate)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use doctriage_core::{NoOcr, ToolName};
    use std::io::Write;

    pub(crate) fn global() -> crate::Global {
        crate::Global {
            config: None,
            dpi: None,
            timeout_ms: None,
            tesseract: "tesseract".into(),
            ocr_lang: "eng+fra".into(),
            no_ocr: true,
            verbose: false,
        }
    }

    pub(crate) fn session() -> Session {
        let config = TriageConfig {
            loader: doctriage_core::config::LoaderConfig {
                dpi: 20,
                max_pages: 10,
            },
            ..Default::default()
        };
        Session::new(config, Arc::new(NoOcr), false)
    }

    /// A text PDF written to a temp file, kept alive by the returned handle.
    pub(crate) fn pdf_file(lines: &[&str]) -> (tempfile::NamedTempFile, String) {
        let mut file = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        file.write_all(&crate::loader::tests::text_pdf(lines)).unwrap();
        let path = file.path().to_string_lossy().to_string();
        (file, path)
    }

    // ========================================================================
    // load_config
    // ========================================================================

    #[test]
    fn test_defaults_without_config_file() {
        let config = load_config(&global()).unwrap();
        assert_eq!(config, TriageConfig::default());
    }

    #[test]
    fn test_config_file_and_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[blank]\nvariance_threshold = 42.0\n\n[loader]\ndpi = 200").unwrap();

        let mut global = global();
        global.config = Some(file.path().to_path_buf());
        global.timeout_ms = Some(2_000);

        let config = load_config(&global).unwrap();
        assert_eq!(config.blank.variance_threshold, 42.0);
        assert_eq!(config.loader.dpi, 200);
        assert_eq!(config.dispatcher.timeout_ms, Some(2_000));

        global.dpi = Some(96);
        assert_eq!(load_config(&global).unwrap().loader.dpi, 96);
    }

    #[test]
    fn test_bad_config_is_rejected() {
        let mut global = global();
        global.config = Some("/definitely/not/here.toml".into());
        let err = load_config(&global).unwrap_err();
        assert!(err.to_string().contains("Cannot read config file"), "{err}");

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[blank]\nvariance_threshold = -1.0").unwrap();
        global.config = Some(file.path().to_path_buf());
        assert!(load_config(&global).is_err());

        global.config = None;
        global.dpi = Some(0);
        assert!(load_config(&global).is_err());
    }

    // ========================================================================
    // Session
    // ========================================================================

    #[tokio::test]
    async fn test_analyze_reference() {
        let (_file, path) = pdf_file(&["Notice of Assessment", "2023 tax year"]);
        let aggregate = session()
            .analyze(&path, vec![ToolRequest::new(ToolName::ExtractFiscalYear)])
            .await
            .unwrap();

        assert_eq!(aggregate.len(), 1);
        assert!(aggregate.get(ToolName::ExtractFiscalYear).unwrap().success);
    }

    #[tokio::test]
    async fn test_missing_reference_is_a_load_error() {
        let err = session()
            .analyze("/definitely/not/here.pdf", ToolRequest::all())
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Unreachable(_)));
    }
}

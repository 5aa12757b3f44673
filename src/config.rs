//! Configuração do wiretrack carregada a partir de `wiretrack.toml`.
//!
//! A struct [`WiretrackConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! A variável de ambiente `WIRETRACK_STORE` tem precedência sobre o arquivo.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::Result;
use crate::workflow::WorkflowDefinition;

/// Configuração de nível superior carregada de `wiretrack.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct WiretrackConfig {
    /// Arquivo JSON onde processos e trilhas de auditoria são persistidos.
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    /// Definição de workflow alternativa. Sem ela, usa o workflow de fios embutido.
    #[serde(default)]
    pub workflow_path: Option<PathBuf>,

    /// Máximo de retentativas quando outra escrita concorrente vence a corrida.
    #[serde(default = "default_max_conflict_retries")]
    pub max_conflict_retries: u32,

    /// Filtro do `tracing-subscriber` quando `RUST_LOG` não está definido.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

// Valor padrão para o arquivo de persistência.
fn default_store_path() -> PathBuf {
    PathBuf::from("wiretrack-store.json")
}

// Valor padrão para retentativas de conflito: 3.
fn default_max_conflict_retries() -> u32 {
    3
}

// Valor padrão para o filtro de log: "info".
fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for WiretrackConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            workflow_path: None,
            max_conflict_retries: default_max_conflict_retries(),
            log_filter: default_log_filter(),
        }
    }
}

impl WiretrackConfig {
    /// Carrega a configuração de `wiretrack.toml` no diretório atual.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("wiretrack.toml"))
    }

    /// Carrega a configuração de um caminho explícito.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<WiretrackConfig>(&contents)?
        } else {
            Self::default()
        };

        // Variável de ambiente tem precedência sobre o arquivo para o caminho do store.
        if let Ok(store) = std::env::var("WIRETRACK_STORE")
            && !store.is_empty()
        {
            config.store_path = PathBuf::from(store);
        }

        Ok(config)
    }

    /// Carrega e valida a definição de workflow configurada.
    pub fn workflow(&self) -> Result<WorkflowDefinition> {
        match &self.workflow_path {
            Some(path) => WorkflowDefinition::load(path),
            None => WorkflowDefinition::wire(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = WiretrackConfig::default();
        assert_eq!(config.store_path, PathBuf::from("wiretrack-store.json"));
        assert_eq!(config.max_conflict_retries, 3);
        assert_eq!(config.log_filter, "info");
        assert!(config.workflow_path.is_none());
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            max_conflict_retries = 5
            workflow_path = "custom.toml"
        "#;
        let config: WiretrackConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.max_conflict_retries, 5);
        assert_eq!(config.workflow_path, Some(PathBuf::from("custom.toml")));
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn load_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = WiretrackConfig::load_from(&dir.path().join("wiretrack.toml")).unwrap();
        assert_eq!(config.max_conflict_retries, 3);
    }

    #[test]
    fn builtin_workflow_when_no_path() {
        let config = WiretrackConfig::default();
        let workflow = config.workflow().unwrap();
        assert_eq!(workflow.first_stage().name, "rawmaterial");
    }

    #[test]
    fn custom_workflow_is_loaded_and_validated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flow.toml");
        std::fs::write(
            &path,
            "[[stages]]\nname = \"intake\"\n\n[[stages.steps]]\nstep = 2\nrole = \"QC\"\naction = \"x\"\n",
        )
        .unwrap();
        let config = WiretrackConfig {
            workflow_path: Some(path),
            ..WiretrackConfig::default()
        };
        assert!(config.workflow().is_err());
    }
}

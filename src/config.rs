use std::path::PathBuf;
use std::str::FromStr;

use crate::agent::SamplingParams;
use crate::errors::AppError;
use crate::retrieval::DEFAULT_TOP_K;

pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "\
Você é um assistente especializado em Suporte de TI e Segurança da Informação, com foco em \
redes de computadores (switches, roteadores, Wi-Fi, cabeamento) e segurança de rede \
(firewalls, VPNs, IPS/IDS).

Sua principal função é:
1. Diagnosticar e solucionar problemas de conectividade, configuração e desempenho.
2. Fornecer recomendações de segurança e mitigação de ameaças.
3. Explicar conceitos técnicos de forma clara e concisa.
4. Ser preciso e factual; se não souber, diga que não tem a informação.
5. Ressaltar a importância de testes em ambiente controlado sempre que uma sugestão puder impactar a segurança.

Evite gerar comandos de configuração para ambientes desconhecidos sem alertar sobre riscos, \
discutir tópicos fora de sua especialidade e inventar informações.

IMPORTANTE: Você DEVE sempre tentar ajudar tecnicamente, nunca redirecionar para suporte externo.";

/// Process configuration, read once at start-up from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub ollama_base_url: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub knowledge_base_dir: PathBuf,
    pub index_path: PathBuf,
    pub retrieval_top_k: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub sampling: SamplingParams,
    pub system_instruction: String,
    pub username: String,
    pub password: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            ollama_base_url: "http://localhost:11434".to_string(),
            chat_model: "llama2:7b-chat".to_string(),
            embedding_model: "all-minilm".to_string(),
            knowledge_base_dir: PathBuf::from("base_conhecimento"),
            index_path: PathBuf::from("faiss_index.json"),
            retrieval_top_k: DEFAULT_TOP_K,
            chunk_size: 1000,
            chunk_overlap: 150,
            sampling: SamplingParams::default(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            username: "admin".to_string(),
            password: "admin123".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup; unset keys keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        let text = |key: &str, target: &mut String| {
            if let Some(v) = lookup(key).filter(|v| !v.trim().is_empty()) {
                *target = v;
            }
        };

        text("OLLAMA_API_BASE_URL", &mut cfg.ollama_base_url);
        text("CHAT_MODEL", &mut cfg.chat_model);
        text("EMBEDDING_MODEL", &mut cfg.embedding_model);
        text("SYSTEM_INSTRUCTION", &mut cfg.system_instruction);
        text("APP_USERNAME", &mut cfg.username);
        text("APP_PASSWORD", &mut cfg.password);

        if let Some(dir) = lookup("KNOWLEDGE_BASE_DIR") {
            cfg.knowledge_base_dir = PathBuf::from(dir);
        }
        if let Some(path) = lookup("INDEX_PATH") {
            cfg.index_path = PathBuf::from(path);
        }

        parse_into(&lookup, "PORT", &mut cfg.port)?;
        parse_into(&lookup, "RETRIEVAL_TOP_K", &mut cfg.retrieval_top_k)?;
        parse_into(&lookup, "CHUNK_SIZE", &mut cfg.chunk_size)?;
        parse_into(&lookup, "CHUNK_OVERLAP", &mut cfg.chunk_overlap)?;
        parse_into(&lookup, "SAMPLING_TEMPERATURE", &mut cfg.sampling.temperature)?;
        parse_into(&lookup, "SAMPLING_TOP_P", &mut cfg.sampling.top_p)?;
        parse_into(&lookup, "SAMPLING_TOP_K", &mut cfg.sampling.top_k)?;
        parse_into(&lookup, "SAMPLING_MAX_TOKENS", &mut cfg.sampling.max_tokens)?;

        if cfg.retrieval_top_k == 0 {
            return Err(AppError::InvalidConfig {
                key: "RETRIEVAL_TOP_K".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(cfg)
    }
}

fn parse_into<F, T>(lookup: &F, key: &str, target: &mut T) -> Result<(), AppError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(key) {
        *target = raw.trim().parse().map_err(|_| AppError::InvalidConfig {
            key: key.to_string(),
            value: raw.clone(),
        })?;
    }
    Ok(())
}

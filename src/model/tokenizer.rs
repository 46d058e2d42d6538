// Location: src/model/tokenizer.rs

use std::fs;
use std::path::Path;

use serde::Deserialize;
use tokenizers::{PaddingParams, Tokenizer as HfTokenizer, TruncationParams};
use tracing::{debug, info};

use crate::error::{Result, StartupError};

/// End-of-sequence spellings tried when the tokenizer config names none
const EOS_CANDIDATES: [&str; 5] = ["</s>", "<|endoftext|>", "<|end_of_text|>", "<|im_end|>", "<|eot_id|>"];

/// Tokenizer paired with the generation model.
///
/// Always exposes a valid pad token: when the source tokenizer has none, the
/// end-of-sequence token doubles as pad token.
pub struct TextTokenizer {
    tokenizer: HfTokenizer,
    special_tokens: SpecialTokens,
    max_length: usize,
}

#[derive(Debug, Clone)]
struct SpecialTokens {
    eos_token: String,
    eos_token_id: u32,
    pad_token: String,
    pad_token_id: u32,
}

/// Subset of `tokenizer_config.json` that matters here
#[derive(Debug, Default, Deserialize)]
struct TokenizerConfigFile {
    #[serde(default)]
    eos_token: Option<SpecialToken>,
    #[serde(default)]
    pad_token: Option<SpecialToken>,
    #[serde(default)]
    model_max_length: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SpecialToken {
    Plain(String),
    Added { content: String },
}

impl SpecialToken {
    fn content(&self) -> &str {
        match self {
            SpecialToken::Plain(s) => s,
            SpecialToken::Added { content } => content,
        }
    }
}

impl TextTokenizer {
    /// Load from a tokenizer directory (or a bare `tokenizer.json` path).
    ///
    /// Inputs are truncated to `max_length` tokens, or to the tokenizer's own
    /// `model_max_length` when that is smaller.
    pub fn from_path(path: impl AsRef<Path>, max_length: usize) -> Result<Self> {
        let path = path.as_ref();
        let (tokenizer_file, config_file) = if path.is_dir() {
            (path.join("tokenizer.json"), Some(path.join("tokenizer_config.json")))
        } else {
            (path.to_path_buf(), path.parent().map(|p| p.join("tokenizer_config.json")))
        };

        if !tokenizer_file.exists() {
            return Err(StartupError::io(
                &tokenizer_file,
                std::io::Error::new(std::io::ErrorKind::NotFound, "tokenizer.json not found"),
            ));
        }

        let tokenizer = HfTokenizer::from_file(&tokenizer_file).map_err(|e| StartupError::Tokenizer {
            path: tokenizer_file.clone(),
            message: e.to_string(),
        })?;

        let config = match config_file {
            Some(file) if file.exists() => read_tokenizer_config(&file)?,
            _ => TokenizerConfigFile::default(),
        };

        Self::configure(tokenizer, config, max_length, &tokenizer_file)
    }

    fn configure(
        mut tokenizer: HfTokenizer,
        config: TokenizerConfigFile,
        max_length: usize,
        origin: &Path,
    ) -> Result<Self> {
        let tokenizer_error = |message: String| StartupError::Tokenizer {
            path: origin.to_path_buf(),
            message,
        };

        let (eos_token, eos_token_id) = config
            .eos_token
            .as_ref()
            .and_then(|t| lookup(&tokenizer, t.content()))
            .or_else(|| EOS_CANDIDATES.iter().find_map(|t| lookup(&tokenizer, t)))
            .ok_or_else(|| {
                tokenizer_error("no end-of-sequence token found; tokenizer does not match a causal LM".to_string())
            })?;

        let configured_pad = config
            .pad_token
            .as_ref()
            .and_then(|t| lookup(&tokenizer, t.content()))
            .or_else(|| {
                tokenizer
                    .get_padding()
                    .map(|p| (p.pad_token.clone(), p.pad_id))
            });

        let (pad_token, pad_token_id) = match configured_pad {
            Some(pad) => pad,
            None => {
                info!(eos_token = %eos_token, "Tokenizer has no pad token, using eos token");
                (eos_token.clone(), eos_token_id)
            }
        };

        let max_length = match config.model_max_length {
            Some(limit) if limit >= 1.0 && limit < max_length as f64 => limit as usize,
            _ => max_length,
        };

        tokenizer.with_padding(Some(PaddingParams {
            pad_id: pad_token_id,
            pad_token: pad_token.clone(),
            ..Default::default()
        }));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length,
                ..Default::default()
            }))
            .map_err(|e| tokenizer_error(e.to_string()))?;

        debug!(
            eos_token_id,
            pad_token_id,
            max_length,
            vocab_size = tokenizer.get_vocab_size(true),
            "Tokenizer configured"
        );

        Ok(Self {
            tokenizer,
            special_tokens: SpecialTokens {
                eos_token,
                eos_token_id,
                pad_token,
                pad_token_id,
            },
            max_length,
        })
    }

    /// Encode with special tokens, truncating to `max_length`
    pub fn encode(&self, text: &str) -> anyhow::Result<Vec<u32>> {
        let encoding = self.tokenizer.encode(text, true).map_err(anyhow::Error::msg)?;
        Ok(encoding.get_ids().to_vec())
    }

    /// Decode ids, dropping special tokens
    pub fn decode(&self, ids: &[u32]) -> anyhow::Result<String> {
        self.tokenizer.decode(ids, true).map_err(anyhow::Error::msg)
    }

    pub fn eos_token(&self) -> &str {
        &self.special_tokens.eos_token
    }

    pub fn eos_token_id(&self) -> u32 {
        self.special_tokens.eos_token_id
    }

    pub fn pad_token(&self) -> &str {
        &self.special_tokens.pad_token
    }

    pub fn pad_token_id(&self) -> u32 {
        self.special_tokens.pad_token_id
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn vocab_size(&self) -> usize {
        self.tokenizer.get_vocab_size(true)
    }

    pub fn token_to_id(&self, token: &str) -> Option<u32> {
        self.tokenizer.token_to_id(token)
    }
}

impl std::fmt::Debug for TextTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextTokenizer")
            .field("special_tokens", &self.special_tokens)
            .field("max_length", &self.max_length)
            .finish()
    }
}

fn lookup(tokenizer: &HfTokenizer, token: &str) -> Option<(String, u32)> {
    tokenizer.token_to_id(token).map(|id| (token.to_string(), id))
}

fn read_tokenizer_config(path: &Path) -> Result<TokenizerConfigFile> {
    let raw = fs::read_to_string(path).map_err(|e| StartupError::io(path, e))?;
    serde_json::from_str(&raw).map_err(|source| StartupError::InvalidConfig {
        path: path.to_path_buf(),
        source,
    })
}

/// Load the tokenizer and enforce the pad-token invariant
pub fn load_tokenizer(path: impl AsRef<Path>, max_length: usize) -> Result<TextTokenizer> {
    let tokenizer = TextTokenizer::from_path(path.as_ref(), max_length)?;
    info!(
        path = %path.as_ref().display(),
        pad_token = tokenizer.pad_token(),
        "Tokenizer loaded"
    );
    Ok(tokenizer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn tokenizer_json(vocab: &[&str], padding: Option<(&str, u32)>) -> String {
        let vocab = vocab
            .iter()
            .enumerate()
            .map(|(i, t)| format!("\"{}\": {}", t, i))
            .collect::<Vec<_>>()
            .join(", ");
        let padding = match padding {
            Some((token, id)) => format!(
                r#"{{"strategy": "BatchLongest", "direction": "Right", "pad_to_multiple_of": null, "pad_id": {}, "pad_type_id": 0, "pad_token": "{}"}}"#,
                id, token
            ),
            None => "null".to_string(),
        };
        format!(
            r#"{{
                "version": "1.0",
                "truncation": null,
                "padding": {},
                "added_tokens": [],
                "normalizer": null,
                "pre_tokenizer": {{"type": "Whitespace"}},
                "post_processor": null,
                "decoder": null,
                "model": {{"type": "WordLevel", "vocab": {{{}}}, "unk_token": "<unk>"}}
            }}"#,
            padding, vocab
        )
    }

    fn write_tokenizer(dir: &Path, json: &str, config: Option<&str>) {
        fs::write(dir.join("tokenizer.json"), json).unwrap();
        if let Some(config) = config {
            fs::write(dir.join("tokenizer_config.json"), config).unwrap();
        }
    }

    #[test]
    fn test_pad_defaults_to_eos() {
        let dir = tempdir().unwrap();
        write_tokenizer(dir.path(), &tokenizer_json(&["<unk>", "</s>", "hello"], None), None);

        let tokenizer = load_tokenizer(dir.path(), 128).unwrap();
        assert_eq!(tokenizer.eos_token(), "</s>");
        assert_eq!(tokenizer.pad_token(), tokenizer.eos_token());
        assert_eq!(tokenizer.pad_token_id(), tokenizer.eos_token_id());
    }

    #[test]
    fn test_explicit_pad_token_kept() {
        let dir = tempdir().unwrap();
        write_tokenizer(
            dir.path(),
            &tokenizer_json(&["<unk>", "</s>", "<pad>", "hello"], None),
            Some(r#"{"eos_token": "</s>", "pad_token": {"content": "<pad>"}}"#),
        );

        let tokenizer = load_tokenizer(dir.path(), 128).unwrap();
        assert_eq!(tokenizer.pad_token(), "<pad>");
        assert_eq!(tokenizer.pad_token_id(), 2);
        assert_eq!(tokenizer.eos_token_id(), 1);
    }

    #[test]
    fn test_padding_from_tokenizer_json() {
        let dir = tempdir().unwrap();
        write_tokenizer(
            dir.path(),
            &tokenizer_json(&["<unk>", "<|endoftext|>", "[PAD]"], Some(("[PAD]", 2))),
            None,
        );

        let tokenizer = load_tokenizer(dir.path(), 128).unwrap();
        assert_eq!(tokenizer.eos_token(), "<|endoftext|>");
        assert_eq!(tokenizer.pad_token(), "[PAD]");
    }

    #[test]
    fn test_missing_eos_is_incompatible() {
        let dir = tempdir().unwrap();
        write_tokenizer(dir.path(), &tokenizer_json(&["<unk>", "hello"], None), None);

        let err = load_tokenizer(dir.path(), 128).unwrap_err();
        assert!(matches!(err, StartupError::Tokenizer { .. }));
    }

    #[test]
    fn test_truncation_limit() {
        let dir = tempdir().unwrap();
        write_tokenizer(
            dir.path(),
            &tokenizer_json(&["<unk>", "</s>", "a"], None),
            Some(r#"{"model_max_length": 4}"#),
        );

        let tokenizer = load_tokenizer(dir.path(), 128).unwrap();
        assert_eq!(tokenizer.max_length(), 4);
        let ids = tokenizer.encode("a a a a a a a a").unwrap();
        assert_eq!(ids.len(), 4);
    }

    #[test]
    fn test_huge_model_max_length_ignored() {
        let dir = tempdir().unwrap();
        write_tokenizer(
            dir.path(),
            &tokenizer_json(&["<unk>", "</s>"], None),
            Some(r#"{"model_max_length": 1e30}"#),
        );

        let tokenizer = load_tokenizer(dir.path(), 256).unwrap();
        assert_eq!(tokenizer.max_length(), 256);
    }

    #[test]
    fn test_missing_tokenizer_fails() {
        let dir = tempdir().unwrap();
        let err = load_tokenizer(dir.path(), 128).unwrap_err();
        assert!(matches!(err, StartupError::Io { .. }));
    }
}

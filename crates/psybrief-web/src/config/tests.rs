#[cfg(test)]
mod tests {
    use super::super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:3001");
        assert!(config.database.url.is_none());
        assert_eq!(config.llm.backend, BackendKind::OpenAi);
        assert_eq!(config.llm.temperature, 0.0);
        assert_eq!(config.ingestion.max_concurrency, 1);
        assert_eq!(config.pubmed.retmax, 45);
        assert_eq!(config.pubmed.reldate, 60);
        assert_eq!(config.normalisation, RuleTables::default());
    }

    #[test]
    fn test_partial_sections_keep_field_defaults() {
        let config = Config::from_toml_str(
            r#"
            [llm]
            backend = "ollama"
            model = "llama3:8b"

            [ingestion]
            max_concurrency = 4

            [normalisation]
            untitled = "Clinical Study"
            "#,
        )
        .unwrap();
        assert_eq!(config.llm.backend, BackendKind::Ollama);
        assert_eq!(config.llm.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.ingestion.max_concurrency, 4);
        assert_eq!(config.normalisation.untitled, "Clinical Study");
        assert_eq!(
            config.normalisation.acronym_map,
            RuleTables::default().acronym_map,
            "tables not named in the file stay built-in"
        );
    }

    #[test]
    fn test_zero_concurrency_is_rejected() {
        let err = Config::from_toml_str("[ingestion]\nmax_concurrency = 0").unwrap_err();
        assert!(err.to_string().contains("max_concurrency"));
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        assert!(Config::from_toml_str("[llm]\nbackend = \"gemini\"").is_err());
    }

    #[test]
    fn test_ollama_backend_needs_no_key() {
        let llm = LlmConfig {
            backend: BackendKind::Ollama,
            api_key_env: "PSYBRIEF_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..LlmConfig::default()
        };
        let backend = llm.build_backend().unwrap();
        assert!(backend.is_local());
    }

    #[test]
    fn test_hosted_backend_without_key_fails() {
        let llm = LlmConfig {
            backend: BackendKind::Anthropic,
            api_key_env: "PSYBRIEF_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..LlmConfig::default()
        };
        let err = llm.build_backend().err().expect("missing key must fail");
        assert!(err.to_string().contains("PSYBRIEF_TEST_KEY_THAT_IS_NEVER_SET"));
    }

    #[test]
    fn test_compatible_backend_needs_base_url() {
        let llm = LlmConfig { backend: BackendKind::OpenAiCompatible, ..LlmConfig::default() };
        assert!(llm.build_backend().is_err());
    }

    #[test]
    fn test_pubmed_search_params() {
        let params = PubmedConfig { retmax: 10, ..PubmedConfig::default() }.search_params();
        assert_eq!(params.retmax, 10);
        assert_eq!(params.sort, "pub+date");
        assert_eq!(params.term, DEFAULT_SEARCH_TERM);
    }
}

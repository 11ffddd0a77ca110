use super::*;
use std::fs;
use tempfile::TempDir;

#[cfg(test)]
mod integration_tests {
    use super::*;

    #[test]
    fn config_file_persistence() {
        let temp_dir = TempDir::new().expect("should create TempDir successfully");
        let config_path = temp_dir.path().join("config.toml");

        let original_config = Config {
            store: StoreConfig {
                protocol: "https".to_string(),
                host: "test-host".to_string(),
                port: 8443,
                api_key: Some("key".to_string()),
                timeout_secs: 30,
            },
            collections: CollectionNames {
                datasets: "Datasets".to_string(),
                ..CollectionNames::default()
            },
            ..Config::default()
        };

        let toml_content = toml::to_string_pretty(&original_config)
            .expect("config should convert to toml string successfully");
        fs::write(&config_path, toml_content).expect("should write to config_path successfully");

        let content =
            fs::read_to_string(&config_path).expect("should read from config_path successfully");
        let loaded_config: Config = toml::from_str(&content).expect("should parse toml correctly");

        assert_eq!(original_config, loaded_config);
    }

    #[test]
    fn invalid_toml_handling() {
        let invalid_toml = r#"
            [store
            host = "localhost"
            port = "invalid_port"
        "#;

        let result: Result<Config, toml::de::Error> = toml::from_str(invalid_toml);
        assert!(result.is_err());
    }

    #[test]
    fn wrong_types_are_rejected() {
        let invalid_toml = r#"
            [store]
            port = "eighty"
        "#;
        let result: Result<Config, toml::de::Error> = toml::from_str(invalid_toml);
        assert!(result.is_err());

        let unknown_kind = r#"
            [upload]
            retry_on = ["sometimes"]
        "#;
        let result: Result<Config, toml::de::Error> = toml::from_str(unknown_kind);
        assert!(result.is_err());
    }

    #[test]
    fn complete_valid_config() {
        let valid_toml = r#"
            [store]
            protocol = "https"
            host = "weaviate.example.com"
            port = 443
            api_key = "wv-key"
            timeout_secs = 90

            [vectorizer]
            module = "text2vec-aws"
            model = "amazon.titan-embed-text-v2:0"
            region = "eu-central-1"

            [upload]
            max_attempts = 3
            backoff_secs = 2
            retry_on = ["timeout", "server"]
            pause_ms = 500
            profile = "compact"

            [limits]
            description = 250
            tags = 3

            [collections]
            datasets = "CatalogDatasets"
        "#;

        let config: Config = toml::from_str(valid_toml).expect("should parse toml successfully");
        assert!(config.validate().is_ok());
        assert_eq!(config.store.timeout_secs, 90);
        assert_eq!(config.vectorizer.region, "eu-central-1");
        assert_eq!(config.upload.retry_on.len(), 2);
        assert_eq!(config.upload.profile, crate::metadata::Profile::Compact);
        assert_eq!(config.limits.description, 250);
        assert_eq!(config.limits.business_purpose, 200);
        assert_eq!(config.limits.tags, 3);
        assert_eq!(config.collections.datasets, "CatalogDatasets");
        assert_eq!(config.collections.domain_tags, "DomainTag");
    }

    #[test]
    fn empty_host_is_invalid() {
        let config = Config {
            store: StoreConfig {
                host: String::new(),
                ..StoreConfig::default()
            },
            ..Config::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn port_boundary_validation() {
        let mut config = StoreConfig::default();

        assert!(config.set_port(1).is_ok());
        assert!(config.set_port(65535).is_ok());
        assert!(config.set_port(0).is_err());
    }

    #[test]
    fn store_url_generation_with_different_hosts() {
        let configs = vec![
            ("http", "localhost", 8080, "http://localhost:8080/"),
            ("http", "127.0.0.1", 9090, "http://127.0.0.1:9090/"),
            (
                "https",
                "secure.example.com",
                443,
                "https://secure.example.com/",
            ),
        ];

        for (protocol, host, port, expected) in configs {
            let config = StoreConfig {
                protocol: protocol.to_string(),
                host: host.to_string(),
                port,
                ..StoreConfig::default()
            };
            let url = config.url().expect("should generate url");
            assert_eq!(url.as_str(), expected);
        }
    }

    #[test]
    fn config_dir_ends_with_app_directory() {
        if let Ok(dir) = Config::config_dir() {
            assert!(dir.ends_with(".catalog-kb") || dir.ends_with("catalog-kb"));
        }
    }
}

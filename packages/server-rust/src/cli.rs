//! Command-line and environment configuration.
//!
//! Every flag has an environment fallback so the same binary runs under
//! systemd, containers and ad-hoc shells. Lists are comma separated.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use rendition_core::DEFAULT_QUALITY;

use crate::network::NetworkConfig;
use crate::service::config::{
    AwsCredentials, AzureCredentials, ObjectCredentials, ServerConfig, DEFAULT_POOL_SIZE,
};
use crate::telemetry::LogFormat;

/// Errors raised while turning CLI input into validated configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid listen address {addr:?}: expected host:port")]
    ListenAddress { addr: String },
    #[error("pool size must be greater than zero")]
    ZeroPoolSize,
    #[error("route pattern does not compile: {0}")]
    Pattern(#[from] regex::Error),
}

#[derive(Debug, Clone, Parser)]
#[command(name = "rendition", version, about = "HTTP image resizing proxy with a shared rendition cache")]
pub struct Cli {
    /// Address to listen on.
    #[arg(short = 'l', long, env = "RENDITION_LISTEN", default_value = "127.0.0.1:8070")]
    pub listen: String,

    /// Allowed media hosts (path prefixes).
    #[arg(short = 'm', long, env = "RENDITION_ALLOWED_MEDIA", value_delimiter = ',')]
    pub allowed_media: Vec<String>,

    /// Allowed sizes, e.g. `320x240,100x100`.
    #[arg(short = 's', long, env = "RENDITION_ALLOWED_SIZES", value_delimiter = ',')]
    pub allowed_sizes: Vec<String>,

    /// Directory for cached renditions.
    #[arg(short = 'c', long, env = "RENDITION_CACHE_DIR", default_value = "/tmp/imgwizard")]
    pub cache_dir: String,

    /// S3 bucket used as the rendition cache.
    #[arg(long, env = "RENDITION_S3_BUCKET")]
    pub s3_bucket: Option<String>,

    /// Azure container used as the rendition cache.
    #[arg(long, env = "RENDITION_AZURE_CONTAINER")]
    pub azure_container: Option<String>,

    /// Image served when the original cannot be found.
    #[arg(long, alias = "thumb", env = "RENDITION_DEFAULT_IMAGE")]
    pub default_image: Option<PathBuf>,

    /// Directories searched for local originals.
    #[arg(short = 'd', long, env = "RENDITION_SEARCH_DIRS", value_delimiter = ',')]
    pub search_dirs: Vec<PathBuf>,

    /// First URL segment routed to the image handler.
    #[arg(long, env = "RENDITION_MARK", default_value = "images")]
    pub mark: String,

    /// Secret that `X-No-Cache` must equal to bypass the cache.
    #[arg(long, env = "RENDITION_NO_CACHE_KEY", hide_env_values = true)]
    pub no_cache_key: Option<String>,

    /// Sibling nodes asked before processing an image.
    #[arg(long, env = "RENDITION_NODES", value_delimiter = ',')]
    pub nodes: Vec<String>,

    /// Default output quality.
    #[arg(
        short = 'q',
        long,
        env = "RENDITION_QUALITY",
        default_value_t = DEFAULT_QUALITY,
        value_parser = clap::value_parser!(u8).range(1..=100)
    )]
    pub quality: u8,

    /// Maximum number of images processed at once.
    #[arg(long, env = "IMGW_POOL_SIZE", default_value_t = DEFAULT_POOL_SIZE)]
    pub pool_size: usize,

    /// Timeout for origin and peer requests, in seconds.
    #[arg(long, env = "RENDITION_ORIGIN_TIMEOUT_SECS", default_value_t = 30)]
    pub origin_timeout_secs: u64,

    /// Timeout for a whole inbound request, in seconds.
    #[arg(long, env = "RENDITION_REQUEST_TIMEOUT_SECS", default_value_t = 60)]
    pub request_timeout_secs: u64,

    /// Grace period for in-flight requests at shutdown, in seconds.
    #[arg(long, env = "RENDITION_DRAIN_TIMEOUT_SECS", default_value_t = 30)]
    pub drain_timeout_secs: u64,

    #[arg(long, env = "RENDITION_LOG_FORMAT", value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,

    /// Serve Prometheus metrics on this address.
    #[arg(long, env = "RENDITION_METRICS_ADDR")]
    pub metrics_addr: Option<SocketAddr>,

    #[arg(long, env = "AWS_REGION", hide = true)]
    pub aws_region: Option<String>,
    #[arg(long, env = "AWS_ACCESS_KEY_ID", hide = true, hide_env_values = true)]
    pub aws_access_key_id: Option<String>,
    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide = true, hide_env_values = true)]
    pub aws_secret_access_key: Option<String>,
    #[arg(long, env = "AZURE_ACCOUNT_NAME", hide = true)]
    pub azure_account_name: Option<String>,
    #[arg(long, env = "AZURE_ACCOUNT_KEY", hide = true, hide_env_values = true)]
    pub azure_account_key: Option<String>,
}

impl Cli {
    /// Validates the arguments and splits them into network and pipeline
    /// configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for an unparseable listen address, a zero
    /// pool size, or a route pattern that does not compile.
    pub fn into_configs(self) -> Result<(NetworkConfig, ServerConfig), ConfigError> {
        let (host, port) = split_listen(&self.listen)?;
        if self.pool_size == 0 {
            return Err(ConfigError::ZeroPoolSize);
        }

        let credentials = ObjectCredentials {
            aws: match (
                non_empty(self.aws_region),
                non_empty(self.aws_access_key_id),
                non_empty(self.aws_secret_access_key),
            ) {
                (Some(region), Some(access_key_id), Some(secret_access_key)) => {
                    Some(AwsCredentials {
                        region,
                        access_key_id,
                        secret_access_key,
                    })
                }
                _ => None,
            },
            azure: match (
                non_empty(self.azure_account_name),
                non_empty(self.azure_account_key),
            ) {
                (Some(account), Some(access_key)) => Some(AzureCredentials {
                    account,
                    access_key,
                }),
                _ => None,
            },
        };

        let network = NetworkConfig {
            host,
            port,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            drain_timeout: Duration::from_secs(self.drain_timeout_secs),
            ..NetworkConfig::default()
        };

        let server = ServerConfig {
            mark: self.mark,
            allowed_sizes: drop_blank(self.allowed_sizes),
            allowed_media: drop_blank(self.allowed_media),
            cache_dir: self.cache_dir,
            s3_bucket: non_empty(self.s3_bucket),
            azure_container: non_empty(self.azure_container),
            default_image: self.default_image.filter(|p| !p.as_os_str().is_empty()),
            search_dirs: self
                .search_dirs
                .into_iter()
                .filter(|p| !p.as_os_str().is_empty())
                .collect(),
            no_cache_key: non_empty(self.no_cache_key),
            nodes: drop_blank(self.nodes),
            default_quality: self.quality,
            pool_size: self.pool_size,
            origin_timeout: Duration::from_secs(self.origin_timeout_secs),
            credentials,
            ..ServerConfig::default()
        };

        server.url_pattern()?;
        Ok((network, server))
    }
}

fn split_listen(addr: &str) -> Result<(String, u16), ConfigError> {
    let err = || ConfigError::ListenAddress {
        addr: addr.to_string(),
    };
    let (host, port) = addr.rsplit_once(':').ok_or_else(err)?;
    let port = port.parse().map_err(|_| err())?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let host = if host.is_empty() { "0.0.0.0" } else { host };
    Ok((host.to_string(), port))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn drop_blank(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["rendition"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).expect("arguments should parse")
    }

    #[test]
    fn defaults_produce_filesystem_config() {
        let (network, server) = parse(&[]).into_configs().unwrap();
        assert_eq!(network.host, "127.0.0.1");
        assert_eq!(network.port, 8070);
        assert_eq!(network.drain_timeout, Duration::from_secs(30));
        assert_eq!(server.mark, "images");
        assert_eq!(server.cache_dir, "/tmp/imgwizard");
        assert_eq!(server.default_quality, 80);
    }

    #[test]
    fn lists_split_on_commas() {
        let cli = parse(&[
            "-s",
            "320x240,100x100",
            "-m",
            "media.example.com,cdn.example.com",
            "--nodes",
            "10.0.0.2:8070,10.0.0.3:8070",
            "-d",
            "/srv/a,/srv/b",
        ]);
        let (_, server) = cli.into_configs().unwrap();
        assert_eq!(server.allowed_sizes, vec!["320x240", "100x100"]);
        assert_eq!(server.allowed_media.len(), 2);
        assert_eq!(server.nodes, vec!["10.0.0.2:8070", "10.0.0.3:8070"]);
        assert_eq!(
            server.search_dirs,
            vec![PathBuf::from("/srv/a"), PathBuf::from("/srv/b")]
        );
    }

    #[test]
    fn thumb_alias_sets_default_image() {
        let (_, server) = parse(&["--thumb", "/srv/404.png"]).into_configs().unwrap();
        assert_eq!(server.default_image, Some(PathBuf::from("/srv/404.png")));
    }

    #[test]
    fn quality_out_of_range_is_rejected() {
        assert!(Cli::try_parse_from(["rendition", "-q", "0"]).is_err());
        assert!(Cli::try_parse_from(["rendition", "-q", "101"]).is_err());
        assert_eq!(parse(&["-q", "65"]).quality, 65);
    }

    #[test]
    fn bad_listen_address_is_an_error() {
        let err = parse(&["-l", "localhost"]).into_configs().unwrap_err();
        assert!(matches!(err, ConfigError::ListenAddress { .. }));
        let err = parse(&["-l", "localhost:http"]).into_configs().unwrap_err();
        assert!(matches!(err, ConfigError::ListenAddress { .. }));
    }

    #[test]
    fn listen_address_variants() {
        assert_eq!(split_listen(":9000").unwrap(), ("0.0.0.0".to_string(), 9000));
        assert_eq!(split_listen("[::1]:9000").unwrap(), ("::1".to_string(), 9000));
    }

    #[test]
    fn zero_pool_size_is_rejected() {
        let err = parse(&["--pool-size", "0"]).into_configs().unwrap_err();
        assert!(matches!(err, ConfigError::ZeroPoolSize));
    }

    #[test]
    fn blank_secret_disables_bypass() {
        let (_, server) = parse(&["--no-cache-key", "  "]).into_configs().unwrap();
        assert!(server.no_cache_key.is_none());
    }

    #[test]
    fn partial_aws_credentials_are_dropped() {
        let (_, server) = parse(&["--aws-region", "eu-west-1"]).into_configs().unwrap();
        assert!(server.credentials.aws.is_none());

        let (_, server) = parse(&[
            "--aws-region",
            "eu-west-1",
            "--aws-access-key-id",
            "id",
            "--aws-secret-access-key",
            "secret",
        ])
        .into_configs()
        .unwrap();
        assert_eq!(server.credentials.aws.unwrap().region, "eu-west-1");
    }
}

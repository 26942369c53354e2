//! 数据源地址解析
//!
//! * `udp://host:port` - 监听UDP，每个数据报是一个PDU
//! * `file:///path`    - 回放原始字节流抓包文件

use std::fmt;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;
use url::{Host, Url};

/// 默认监听地址
pub const DEFAULT_SOURCE: &str = "udp://127.0.0.1:52001";

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("无效的数据源地址: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("不支持的数据源类型: {0}")]
    UnsupportedScheme(String),

    #[error("UDP地址缺少主机: {0}")]
    MissingHost(String),

    #[error("UDP地址缺少端口: {0}")]
    MissingPort(String),

    #[error("解析主机{host}失败: {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("主机{0}没有可用地址")]
    NoAddress(String),

    #[error("无效的文件路径: {0}")]
    InvalidFilePath(String),
}

/// 字节流来源
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamSource {
    Udp(SocketAddr),
    File(PathBuf),
}

impl StreamSource {
    pub fn parse(input: &str) -> Result<Self, SourceError> {
        let url = Url::parse(input)?;

        match url.scheme() {
            "udp" => {
                let port = url
                    .port()
                    .ok_or_else(|| SourceError::MissingPort(input.to_string()))?;
                let addr = match url.host() {
                    Some(Host::Ipv4(ip)) => SocketAddr::new(IpAddr::V4(ip), port),
                    Some(Host::Ipv6(ip)) => SocketAddr::new(IpAddr::V6(ip), port),
                    Some(Host::Domain(domain)) => resolve(domain, port)?,
                    None => return Err(SourceError::MissingHost(input.to_string())),
                };
                Ok(StreamSource::Udp(addr))
            }
            "file" => url
                .to_file_path()
                .map(StreamSource::File)
                .map_err(|_| SourceError::InvalidFilePath(input.to_string())),
            other => Err(SourceError::UnsupportedScheme(other.to_string())),
        }
    }
}

fn resolve(domain: &str, port: u16) -> Result<SocketAddr, SourceError> {
    // 非特殊协议的主机名可能是未解析的IP文本
    if let Ok(ip) = domain.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }
    (domain, port)
        .to_socket_addrs()
        .map_err(|source| SourceError::Resolve {
            host: domain.to_string(),
            source,
        })?
        .next()
        .ok_or_else(|| SourceError::NoAddress(domain.to_string()))
}

impl FromStr for StreamSource {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for StreamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamSource::Udp(addr) => write!(f, "udp://{}", addr),
            StreamSource::File(path) => write!(f, "file://{}", path.display()),
        }
    }
}

impl Default for StreamSource {
    fn default() -> Self {
        StreamSource::Udp(SocketAddr::from(([127, 0, 0, 1], 52001)))
    }
}

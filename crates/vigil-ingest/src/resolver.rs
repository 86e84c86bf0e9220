use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// DNS 查询抽象
///
/// 查询失败一律返回 None，解析层不区分失败原因。
#[async_trait]
pub trait DnsLookup: Send + Sync {
    /// 正向解析主机名
    async fn forward(&self, host: &str) -> Option<Vec<IpAddr>>;

    /// 反向解析地址（PTR）
    async fn reverse(&self, ip: IpAddr) -> Option<Vec<String>>;
}

/// hickory-resolver 实现
pub struct HickoryDns {
    resolver: TokioAsyncResolver,
}

impl HickoryDns {
    /// 使用系统 DNS 配置
    pub fn system() -> anyhow::Result<Self> {
        let resolver = TokioAsyncResolver::tokio_from_system_conf()?;
        Ok(Self { resolver })
    }

    /// 使用默认公共 DNS，单次查询超时 `timeout`
    pub fn with_timeout(timeout: Duration) -> Self {
        let mut opts = ResolverOpts::default();
        opts.timeout = timeout;
        let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), opts);
        Self { resolver }
    }
}

#[async_trait]
impl DnsLookup for HickoryDns {
    async fn forward(&self, host: &str) -> Option<Vec<IpAddr>> {
        match self.resolver.lookup_ip(host).await {
            Ok(lookup) => Some(lookup.iter().collect()),
            Err(e) => {
                debug!(host = %host, error = %e, "Forward DNS lookup failed");
                None
            }
        }
    }

    async fn reverse(&self, ip: IpAddr) -> Option<Vec<String>> {
        match self.resolver.reverse_lookup(ip).await {
            Ok(lookup) => Some(lookup.iter().map(|name| name.to_utf8()).collect()),
            Err(e) => {
                debug!(ip = %ip, error = %e, "Reverse DNS lookup failed");
                None
            }
        }
    }
}

/// 主机地址解析器
///
/// 把上报的主机名和候选地址对账：逐个候选地址做反向解析，
/// 取第一个 PTR 名包含主机名（忽略大小写）的候选；没有匹配
/// 或没有候选时退回正向解析。整个过程由显式超时约束，任何
/// 失败都降级为 None，绝不阻塞入库路径。
pub struct HostResolver {
    dns: Arc<dyn DnsLookup>,
    timeout: Duration,
}

impl HostResolver {
    pub fn new(dns: Arc<dyn DnsLookup>, timeout: Duration) -> Self {
        Self { dns, timeout }
    }

    pub async fn resolve(&self, host_name: &str, candidates: &[IpAddr]) -> Option<IpAddr> {
        match tokio::time::timeout(self.timeout, self.resolve_inner(host_name, candidates)).await {
            Ok(result) => result,
            Err(_) => {
                debug!(host = %host_name, "Host resolution timed out");
                None
            }
        }
    }

    async fn resolve_inner(&self, host_name: &str, candidates: &[IpAddr]) -> Option<IpAddr> {
        let host_lower = host_name.to_lowercase();

        // 每个候选地址单独反查，不复用上一轮的地址
        for &candidate in candidates {
            if let Some(names) = self.dns.reverse(candidate).await {
                if names
                    .iter()
                    .any(|name| name.to_lowercase().contains(&host_lower))
                {
                    return Some(candidate);
                }
            }
        }

        self.dns.forward(host_name).await?.into_iter().next()
    }
}

//! 探针运行器
//!
//! 对每台主机依次执行请求的探针，并把结果写入结果矩阵。
//!
//! - 可达性先于其他探针执行；未请求但有探针依赖它时隐式执行，结果不写入矩阵
//! - 依赖可达性的探针在主机未通过可达性检测时记为 `Skipped`
//! - 探针返回错误或异常终止时记为 `Error`，不影响同一主机的其他探针和其他主机
//! - 主机间可以限量并发，单台主机内的探针顺序执行

use crate::health::matrix::ResultMatrix;
use crate::health::probe::{Probe, ProbeKind, ProbeSet};
use crate::health::result::{CellStatus, ResultCell};
use crate::inventory::Host;
use futures::future::join_all;
use futures::FutureExt;
use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// 探针运行器
pub struct ProbeRunner {
    /// 隐式可达性探针
    implicit_reachability: Arc<dyn Probe>,
    /// 同时检测的最大主机数
    max_concurrent_hosts: usize,
    /// 目标域（写入结果矩阵）
    domain: String,
}

impl ProbeRunner {
    /// 创建运行器
    ///
    /// # 参数
    /// * `implicit_reachability` - 请求中没有可达性探针时用于判定前置条件的探针
    pub fn new(implicit_reachability: Arc<dyn Probe>) -> Self {
        Self {
            implicit_reachability,
            max_concurrent_hosts: 1,
            domain: String::new(),
        }
    }

    /// 设置主机并发数（最小为1）
    pub fn with_max_concurrent_hosts(mut self, max_concurrent_hosts: usize) -> Self {
        self.max_concurrent_hosts = max_concurrent_hosts.max(1);
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    /// 对所有主机执行探针
    ///
    /// # 参数
    /// * `hosts` - 目标主机（矩阵行按此顺序排列，名称重复的主机只检测第一次出现的那台）
    /// * `probes` - 请求的探针（矩阵列按此顺序排列）
    ///
    /// # 返回
    /// * `ResultMatrix` - 每台主机每个探针恰好一个结果
    pub async fn run(&self, hosts: &[Host], probes: &ProbeSet) -> ResultMatrix {
        let mut seen = HashSet::new();
        let hosts: Vec<&Host> = hosts
            .iter()
            .filter(|host| {
                let first = seen.insert(host.name.to_lowercase());
                if !first {
                    warn!("主机名称重复，忽略: {}", host);
                }
                first
            })
            .collect();

        info!(
            "开始检测: {} 台主机, {} 个探针, 并发数 {}",
            hosts.len(),
            probes.len(),
            self.max_concurrent_hosts
        );

        let mut matrix = ResultMatrix::new(self.domain.clone(), probes.names());
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_hosts));

        let rows = join_all(hosts.iter().map(|&host| {
            let semaphore = semaphore.clone();
            async move {
                // 获取信号量许可
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => Some(permit),
                    Err(_) => {
                        warn!("获取并发许可失败，直接检测主机: {}", host);
                        None
                    }
                };
                (host, self.run_host(host, probes).await)
            }
        }))
        .await;

        // join_all 按输入顺序返回，行顺序与主机顺序一致
        for (host, cells) in rows {
            matrix.insert_row(host, cells);
        }
        matrix.finish();

        let summary = matrix.summary();
        info!(
            "检测完成: 通过 {}, 失败 {}, 跳过 {}, 错误 {}",
            summary.passed, summary.failed, summary.skipped, summary.errors
        );
        matrix
    }

    /// 对单台主机执行探针
    ///
    /// # 返回
    /// * `Vec<(String, ResultCell)>` - 按请求顺序排列的 (探针名称, 结果)
    pub async fn run_host(&self, host: &Host, probes: &ProbeSet) -> Vec<(String, ResultCell)> {
        debug!("开始检测主机: {}", host);

        // 可达性必须先执行
        let requested = probes.reachability();
        let reachability_cell = match requested {
            Some(probe) => Some(evaluate_guarded(probe.as_ref(), host).await),
            None if probes.any_gated() => {
                debug!("隐式执行可达性检测: {}", host);
                Some(evaluate_guarded(self.implicit_reachability.as_ref(), host).await)
            }
            None => None,
        };
        let reachability_status = reachability_cell.as_ref().map(|c| c.status);
        if let Some(status) = reachability_status {
            if status != CellStatus::Passed {
                warn!("主机 {} 可达性检测未通过: {}", host, status);
            }
        }

        let mut recorded_reachability = if requested.is_some() {
            reachability_cell
        } else {
            None
        };

        let mut cells = Vec::with_capacity(probes.len());
        for probe in probes.iter() {
            let cell = if probe.kind() == ProbeKind::Reachability {
                match recorded_reachability.take() {
                    Some(cell) => cell,
                    None => evaluate_guarded(probe.as_ref(), host).await,
                }
            } else if probe.requires_reachability()
                && reachability_status != Some(CellStatus::Passed)
            {
                ResultCell::skipped(skip_reason(reachability_status))
            } else {
                evaluate_guarded(probe.as_ref(), host).await
            };

            if cell.status == CellStatus::Failed {
                warn!(
                    "{} / {}: {} {}",
                    host,
                    probe.name(),
                    cell.status,
                    cell.detail.as_deref().unwrap_or("")
                );
            } else {
                debug!("{} / {}: {} ({}ms)", host, probe.name(), cell.status, cell.elapsed_ms());
            }
            cells.push((probe.name().to_string(), cell));
        }

        debug!("主机检测完成: {}", host);
        cells
    }
}

fn skip_reason(reachability: Option<CellStatus>) -> &'static str {
    match reachability {
        Some(CellStatus::Error) => "可达性检测出错",
        _ => "主机不可达",
    }
}

/// 执行单个探针，错误和异常都转换为 `Error` 单元格
async fn evaluate_guarded(probe: &dyn Probe, host: &Host) -> ResultCell {
    let start = Instant::now();
    let outcome = AssertUnwindSafe(probe.evaluate(host)).catch_unwind().await;
    let cell = match outcome {
        Ok(Ok(cell)) => cell,
        Ok(Err(e)) => {
            warn!("探针 {} 在主机 {} 上执行失败: {}", probe.name(), host, e);
            ResultCell::error(e.to_string())
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!("探针 {} 在主机 {} 上异常终止: {}", probe.name(), host, message);
            ResultCell::error(format!("探针异常终止: {message}"))
        }
    };
    cell.with_elapsed(start.elapsed())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "未知错误".to_string()
    }
}

//! 结果矩阵
//!
//! 一次运行的全部结果，按 (主机, 探针) 索引。行按主机枚举顺序排列，
//! 列按探针请求顺序排列。矩阵只能由运行器填充，对外只读。

use crate::health::result::{CellStatus, ResultCell};
use crate::inventory::Host;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 一个探针在某台主机上的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeCell {
    /// 探针名称
    pub probe: String,
    /// 结果
    pub result: ResultCell,
}

/// 矩阵中的一行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostRow {
    /// 主机
    pub host: Host,
    /// 按探针请求顺序排列的结果
    pub cells: Vec<ProbeCell>,
}

impl HostRow {
    /// 按探针名称查找结果
    pub fn get(&self, probe: &str) -> Option<&ResultCell> {
        self.cells
            .iter()
            .find(|c| c.probe == probe)
            .map(|c| &c.result)
    }
}

/// 状态统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixSummary {
    /// 主机数
    pub hosts: usize,
    /// 单元格总数
    pub cells: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl MatrixSummary {
    /// 失败或错误的单元格数
    pub fn problems(&self) -> usize {
        self.failed + self.errors
    }
}

/// 结果矩阵
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultMatrix {
    /// 运行ID
    run_id: Uuid,
    /// 目标域
    domain: String,
    /// 开始时间
    started_at: DateTime<Utc>,
    /// 结束时间
    finished_at: Option<DateTime<Utc>>,
    /// 列（探针名称）
    columns: Vec<String>,
    /// 行
    rows: Vec<HostRow>,
}

impl ResultMatrix {
    pub(crate) fn new(domain: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            domain: domain.into(),
            started_at: Utc::now(),
            finished_at: None,
            columns,
            rows: Vec::new(),
        }
    }

    /// 写入一个单元格
    ///
    /// 主机首次出现时追加新行；同一 (主机, 探针) 再次写入时覆盖旧值。
    pub(crate) fn insert(&mut self, host: &Host, probe: &str, result: ResultCell) {
        let index = self.row_index(host);
        let row = &mut self.rows[index];
        match row.cells.iter_mut().find(|c| c.probe == probe) {
            Some(existing) => existing.result = result,
            None => row.cells.push(ProbeCell {
                probe: probe.to_string(),
                result,
            }),
        }
    }

    /// 写入一整行
    ///
    /// 没有任何单元格时也会保留这台主机的行。
    pub(crate) fn insert_row(&mut self, host: &Host, cells: Vec<(String, ResultCell)>) {
        self.row_index(host);
        for (probe, result) in cells {
            self.insert(host, &probe, result);
        }
    }

    /// 主机所在行的下标，不存在时追加新行
    fn row_index(&mut self, host: &Host) -> usize {
        if let Some(index) = self.rows.iter().position(|r| r.host.name == host.name) {
            return index;
        }
        self.rows.push(HostRow {
            host: host.clone(),
            cells: Vec::with_capacity(self.columns.len()),
        });
        self.rows.len() - 1
    }

    pub(crate) fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// 查询 (主机, 探针) 的结果
    ///
    /// # 参数
    /// * `host` - 主机名称
    /// * `probe` - 探针名称
    pub fn get(&self, host: &str, probe: &str) -> Option<&ResultCell> {
        self.row(host).and_then(|row| row.get(probe))
    }

    /// 查询某台主机的行
    pub fn row(&self, host: &str) -> Option<&HostRow> {
        self.rows.iter().find(|r| r.host.name == host)
    }

    pub fn rows(&self) -> &[HostRow] {
        &self.rows
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn hosts(&self) -> impl Iterator<Item = &Host> {
        self.rows.iter().map(|r| &r.host)
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// 运行耗时
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.finished_at.map(|end| end - self.started_at)
    }

    /// 统计各状态的单元格数
    pub fn summary(&self) -> MatrixSummary {
        let mut summary = MatrixSummary {
            hosts: self.rows.len(),
            ..Default::default()
        };
        for cell in self.rows.iter().flat_map(|r| r.cells.iter()) {
            summary.cells += 1;
            match cell.result.status {
                CellStatus::Passed => summary.passed += 1,
                CellStatus::Failed => summary.failed += 1,
                CellStatus::Skipped => summary.skipped += 1,
                CellStatus::Error => summary.errors += 1,
            }
        }
        summary
    }

    /// 是否存在失败或错误的单元格
    pub fn has_problems(&self) -> bool {
        self.rows
            .iter()
            .flat_map(|r| r.cells.iter())
            .any(|c| c.result.status.is_problem())
    }
}

//! 检测报告输出
//!
//! 把结果矩阵渲染为文本、表格或JSON

use crate::cli::args::OutputFormat;
use crate::health::{CellStatus, ResultCell, ResultMatrix};
use crate::inventory::Host;

/// 按指定格式渲染结果矩阵
pub fn render_matrix(matrix: &ResultMatrix, format: OutputFormat) -> serde_json::Result<String> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(matrix),
        OutputFormat::Table => Ok(render_table(matrix)),
        OutputFormat::Text => Ok(render_text(matrix)),
    }
}

/// 按指定格式渲染主机列表
pub fn render_hosts(hosts: &[Host], format: OutputFormat) -> serde_json::Result<String> {
    if format == OutputFormat::Json {
        return serde_json::to_string_pretty(hosts);
    }
    let mut out = String::new();
    for host in hosts {
        match host.address {
            Some(address) => out.push_str(&format!("{} ({})\n", host.name, address)),
            None => out.push_str(&format!("{}\n", host.name)),
        }
    }
    out.push_str(&format!("共 {} 台域控制器\n", hosts.len()));
    Ok(out)
}

fn status_icon(status: CellStatus) -> &'static str {
    match status {
        CellStatus::Passed => "✓",
        CellStatus::Failed => "✗",
        CellStatus::Skipped => "-",
        CellStatus::Error => "!",
    }
}

/// 单元格的简短文本
fn cell_text(cell: &ResultCell) -> String {
    match (cell.status, &cell.value) {
        (CellStatus::Passed, Some(value)) => value.to_string(),
        (status, Some(value)) => format!("{status}({value})"),
        (status, None) => status.to_string(),
    }
}

fn render_text(matrix: &ResultMatrix) -> String {
    let mut out = String::new();
    out.push_str(&format!("域: {}\n", matrix.domain()));
    out.push_str(&format!("运行ID: {}\n", matrix.run_id()));
    out.push_str(&format!(
        "开始时间: {}\n",
        matrix.started_at().format("%Y-%m-%d %H:%M:%S UTC")
    ));

    let name_width = matrix
        .columns()
        .iter()
        .map(|c| c.chars().count())
        .max()
        .unwrap_or(0);

    for row in matrix.rows() {
        out.push('\n');
        out.push_str(&format!("{}\n", row.host));
        for cell in &row.cells {
            let result = &cell.result;
            let mut line = format!(
                "  {} {:<width$}  {}",
                status_icon(result.status),
                cell.probe,
                result.status,
                width = name_width
            );
            if let Some(value) = &result.value {
                line.push_str(&format!("  {value}"));
            }
            if let Some(detail) = &result.detail {
                line.push_str(&format!("  {detail}"));
            }
            out.push_str(line.trim_end());
            out.push('\n');
        }
    }

    let summary = matrix.summary();
    out.push('\n');
    out.push_str(&format!(
        "汇总: {} 台主机, 通过 {}, 失败 {}, 跳过 {}, 错误 {}\n",
        summary.hosts, summary.passed, summary.failed, summary.skipped, summary.errors
    ));
    out
}

fn render_table(matrix: &ResultMatrix) -> String {
    let mut header = vec!["主机".to_string()];
    header.extend(matrix.columns().iter().cloned());

    let body: Vec<Vec<String>> = matrix
        .rows()
        .iter()
        .map(|row| {
            let mut line = vec![row.host.name.clone()];
            line.extend(matrix.columns().iter().map(|column| {
                row.get(column)
                    .map(cell_text)
                    .unwrap_or_else(|| "N/A".to_string())
            }));
            line
        })
        .collect();

    let widths: Vec<usize> = (0..header.len())
        .map(|i| {
            std::iter::once(&header)
                .chain(body.iter())
                .map(|line| line[i].chars().count())
                .max()
                .unwrap_or(0)
        })
        .collect();

    let format_line = |line: &[String]| {
        let cells: Vec<String> = line
            .iter()
            .zip(&widths)
            .map(|(text, width)| format!("{text:<width$}"))
            .collect();
        cells.join(" | ").trim_end().to_string()
    };

    let mut out = String::new();
    out.push_str(&format_line(&header));
    out.push('\n');
    let total: usize = widths.iter().sum::<usize>() + 3 * widths.len().saturating_sub(1);
    out.push_str(&"-".repeat(total));
    out.push('\n');
    for line in &body {
        out.push_str(&format_line(line));
        out.push('\n');
    }
    out
}

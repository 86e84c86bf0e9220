use crate::payload::TelemetryRecord;
use thiserror::Error;
use tracing::debug;
use vigil_types::{parse_phase_duration, Event, PhaseTimings, TelemetryStream};

/// 失败原因标签（Failed 消息第 2 行）
const FAILURE_REASON_LABEL: &str = "Failure reason: ";
/// 失败详情标签
const FAILURE_DETAILS_LABEL: &str = "Failure details:";
/// Successful 消息第 4 行的固定头
const TEST_DETAILS_HEADER: &str = "Test Details";

/// 解析错误
///
/// 只有消息体缺失是硬失败；无法识别的消息形状一律降级为
/// Undetermined 并保留原文，绝不中断入库。
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("telemetry record has no message body")]
    MissingMessage,
}

/// 事件解析器
///
/// 按消息首行第一个空白分隔的 token（忽略大小写）分类：
/// `successful` / `failed` / 其他 → Undetermined。
/// Successful / Failed 消息块是固定形状的按行契约，解析前先校验
/// 预期的标签行，偏差一律降级而不是报错。
#[derive(Debug, Clone, Default)]
pub struct EventParser;

impl EventParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(
        &self,
        record: &TelemetryRecord,
        stream: TelemetryStream,
    ) -> Result<Event, ParseError> {
        let raw = record
            .message
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .ok_or(ParseError::MissingMessage)?;

        // 分类与行偏移用去掉首尾空白的视图；raw_message 逐字节保留原文
        let message = raw.trim();
        let lines: Vec<&str> = message.lines().map(str::trim_end).collect();
        let first_token = lines
            .first()
            .and_then(|line| line.split_whitespace().next())
            .unwrap_or("")
            .to_ascii_lowercase();

        let host = &record.host.name;
        let mut event = match first_token.as_str() {
            "successful" => parse_successful(host, record, &lines, raw),
            "failed" => parse_failed(host, record, &lines, raw),
            _ => Event::undetermined(host.clone(), record.timestamp, raw),
        };

        event.record_number = record.record_number;
        event.event_source = record.source_name.clone();
        event.windows_log = record.log_name.clone();
        event.event_code = record.event_id;
        event.stream = stream;

        Ok(event)
    }
}

/// 解析 Successful 消息块
///
/// 行契约（1 起数）：第 1 行末 token 为 broker 名；第 4 行必须是
/// `Test Details` 头；第 5 行末 token 为测试结果；第 6~10 行按固定
/// 顺序给出五个阶段耗时（`HH:MM:SS.ffffff`）。
fn parse_successful(
    host: &str,
    record: &TelemetryRecord,
    lines: &[&str],
    raw: &str,
) -> Event {
    let parsed = (|| {
        if lines.len() < 10 {
            return None;
        }
        if !lines[3].contains(TEST_DETAILS_HEADER) {
            return None;
        }

        let broker = lines[0].split_whitespace().last()?.to_string();

        let test_result = match lines[4].split_whitespace().last()? {
            token if token.eq_ignore_ascii_case("true") => true,
            token if token.eq_ignore_ascii_case("false") => false,
            _ => return None,
        };

        let mut durations = [std::time::Duration::ZERO; 5];
        for (slot, line) in durations.iter_mut().zip(&lines[5..10]) {
            let token = line.split_whitespace().last()?;
            *slot = parse_phase_duration(token)?;
        }

        Some((broker, test_result, PhaseTimings::from_ordered(durations)))
    })();

    match parsed {
        Some((broker, test_result, timings)) => Event::successful(
            host,
            record.timestamp,
            broker,
            test_result,
            timings,
            raw,
        ),
        None => {
            debug!(host = %host, "Successful message deviates from expected shape, degrading");
            Event::undetermined(host, record.timestamp, raw)
        }
    }
}

/// 解析 Failed 消息块
///
/// 失败原因按标签取（预期在第 2 行）；失败详情优先跟随
/// `Failure details:` 标签，否则退回固定切片（去掉前 11 行和
/// 最后 1 行）。
fn parse_failed(host: &str, record: &TelemetryRecord, lines: &[&str], raw: &str) -> Event {
    let reason = lines
        .iter()
        .find_map(|line| line.strip_prefix(FAILURE_REASON_LABEL))
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty());

    let reason = match reason {
        Some(r) => r,
        None => {
            debug!(host = %host, "Failed message has no failure reason label, degrading");
            return Event::undetermined(host, record.timestamp, raw);
        }
    };

    let details_slice: &[&str] = if let Some(label_idx) = lines
        .iter()
        .position(|line| line.trim().eq_ignore_ascii_case(FAILURE_DETAILS_LABEL))
    {
        let end = lines.len().saturating_sub(1).max(label_idx + 1);
        &lines[label_idx + 1..end]
    } else if lines.len() > 12 {
        &lines[11..lines.len() - 1]
    } else {
        &[]
    };

    let details = if details_slice.is_empty() {
        None
    } else {
        Some(details_slice.join("\n"))
    };

    Event::failed(host, record.timestamp, reason, details, raw)
}

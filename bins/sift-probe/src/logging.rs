//! 日志初始化模块.
//!
//! 库 crate 通过 `log` 门面输出, 由 tracing-subscriber 的 log 桥接收集.
//!
//! 级别体系 (优先级: SIFT_LOG 环境变量 > 命令行 > 默认):
//! - 默认:   warn  (探测结果走 stdout, 日志只报告异常)
//! - `-v`:   info  (打开、选轨、定位等生命周期事件)
//! - `-vv`:  debug (内部状态/决策)
//! - `-vvv`: trace (仅 sift 项目 crate)
//!
//! 控制台日志写到 stderr. 指定日志目录时另写一份按天滚动的文件日志
//! `{dir}/{prefix}.{date}.log`.

use std::path::Path;
use std::sync::OnceLock;

use chrono::{Datelike, Local, Timelike};
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt::{self, FormatEvent, FormatFields, format::Writer},
    layer::{Layer, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
};

static LOG_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// 本项目所有 crate 的 target 前缀
const SIFT_CRATE_TARGETS: &[&str] = &[
    "sift",
    "sift_core",
    "sift_codec",
    "sift_format",
    "sift_player",
    "sift_probe",
];

fn build_sift_trace_filter() -> EnvFilter {
    let mut directives = SIFT_CRATE_TARGETS
        .iter()
        .map(|t| format!("{t}=trace"))
        .collect::<Vec<_>>();
    directives.push("info".to_string());
    EnvFilter::new(directives.join(","))
}

/// 根据 verbosity 构建 EnvFilter
fn build_filter(verbosity: u8) -> EnvFilter {
    match verbosity {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => build_sift_trace_filter(),
    }
}

fn filter(verbosity: u8) -> EnvFilter {
    EnvFilter::try_from_env("SIFT_LOG").unwrap_or_else(|_| build_filter(verbosity))
}

/// 初始化日志系统
///
/// 文件日志创建失败时只保留控制台输出.
pub fn init(file_prefix: &str, verbosity: u8, log_dir: Option<&Path>) {
    let console_layer = fmt::Layer::default()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .event_format(ConsoleFormatter)
        .with_filter(filter(verbosity));

    let file_layer = log_dir.and_then(|dir| {
        std::fs::create_dir_all(dir).ok()?;
        let appender = tracing_appender::rolling::RollingFileAppender::builder()
            .rotation(tracing_appender::rolling::Rotation::DAILY)
            .filename_prefix(file_prefix)
            .filename_suffix("log")
            .build(dir);
        let appender = match appender {
            Ok(a) => a,
            Err(e) => {
                eprintln!("创建日志文件失败, 只输出到控制台: {e}");
                return None;
            }
        };
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        LOG_GUARD.set(guard).ok();
        Some(
            fmt::Layer::default()
                .with_writer(non_blocking)
                .with_ansi(false)
                .event_format(FileFormatter)
                .with_filter(filter(verbosity)),
        )
    });

    Registry::default()
        .with(console_layer)
        .with(file_layer)
        .init();
}

/// Console 格式: 彩色, 带时间戳
struct ConsoleFormatter;

impl<S, N> FormatEvent<S, N> for ConsoleFormatter
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &fmt::FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = Local::now();
        let meta = event.metadata();
        let color = match *meta.level() {
            tracing::Level::ERROR => "\x1b[31m",
            tracing::Level::WARN => "\x1b[33m",
            tracing::Level::INFO => "\x1b[32m",
            _ => "\x1b[34m",
        };
        write!(
            writer,
            "[{:02}:{:02}:{:02}.{:03}] {}{:5}\x1b[0m > ",
            now.hour(),
            now.minute(),
            now.second(),
            now.timestamp_subsec_millis(),
            color,
            meta.level(),
        )?;
        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// File 格式: 无色, 日期 + 级别 + target + 消息
struct FileFormatter;

impl<S, N> FormatEvent<S, N> for FileFormatter
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &fmt::FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = Local::now();
        let meta = event.metadata();
        write!(
            writer,
            "[{:02}-{:02} {:02}:{:02}:{:02}.{:03}] {:5} {} > ",
            now.month(),
            now.day(),
            now.hour(),
            now.minute(),
            now.second(),
            now.timestamp_subsec_millis(),
            meta.level(),
            meta.target(),
        )?;
        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

//! Terminal viewer: connects to the attendance stream and prints the
//! reduced state after every update.
//!
//! Usage: `attendance-watch [ws-url] [records|punches]`

use anyhow::{Context, anyhow};
use awc::ws::{Frame, Message};
use chrono::{DateTime, Utc};
use dotenvy::dotenv;
use futures_util::{SinkExt, StreamExt};
use std::env;

use attendance_live::aggregate::DEFAULT_THRESHOLD_MINUTES;
use attendance_live::client::{ClientReducer, RecordView};
use attendance_live::codec::DecodeError;
use attendance_live::config::{PayloadMode, parse_threshold};
use attendance_live::model::{DayRecord, Status};

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

enum View {
    Records(RecordView),
    Punches(ClientReducer),
}

impl View {
    fn apply(&mut self, raw: &[u8]) -> Result<(), DecodeError> {
        match self {
            View::Records(view) => view.apply(raw),
            View::Punches(reducer) => reducer.apply(raw),
        }
    }

    fn records(&self) -> &[DayRecord] {
        match self {
            View::Records(view) => view.records(),
            View::Punches(reducer) => reducer.records(),
        }
    }

    fn last_updated(&self) -> Option<i64> {
        match self {
            View::Records(view) => view.last_updated(),
            View::Punches(reducer) => reducer.last_updated(),
        }
    }
}

fn print_summary(view: &View) {
    let updated = view
        .last_updated()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|at| at.to_rfc3339())
        .unwrap_or_else(|| "-".to_string());

    let records = view.records();
    let Some(latest) = records.first().map(|r| r.date) else {
        println!("[{updated}] no attendance yet");
        return;
    };

    let day: Vec<&DayRecord> = records.iter().filter(|r| r.date == latest).collect();
    let count = |status: Status| day.iter().filter(|r| r.status == status).count();
    println!(
        "[{updated}] {latest} ({}) early {} / on time {} / late {} / absent {}",
        day.first().map(|r| r.day_of_week.as_str()).unwrap_or_default(),
        count(Status::Early),
        count(Status::OnTime),
        count(Status::Late),
        count(Status::Absent),
    );
    for record in day {
        println!(
            "  {:>6}  {:<28} {:>8} {:>8}  {}",
            record.employee_id,
            record.name,
            record.time_in.map(|t| t.to_string()).unwrap_or_default(),
            record.time_out.map(|t| t.to_string()).unwrap_or_default(),
            record.status,
        );
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let mut args = env::args().skip(1);
    let url = args
        .next()
        .unwrap_or_else(|| "ws://127.0.0.1:8090/ws".to_string());
    let mode: PayloadMode = match args.next().or_else(|| env::var("PAYLOAD_MODE").ok()) {
        Some(raw) => raw.parse()?,
        None => PayloadMode::Records,
    };
    let threshold = match env::var("LATE_THRESHOLD") {
        Ok(raw) => parse_threshold(&raw).context("LATE_THRESHOLD")?,
        Err(_) => DEFAULT_THRESHOLD_MINUTES,
    };
    let retention_days = match env::var("RETENTION_DAYS") {
        Ok(raw) => Some(raw.trim().parse::<u32>().context("RETENTION_DAYS")?),
        Err(_) => None,
    };

    let mut view = match mode {
        PayloadMode::Records => View::Records(RecordView::new()),
        PayloadMode::Punches => View::Punches(ClientReducer::local(threshold).with_retention(retention_days)),
    };

    let (_response, mut stream) = awc::Client::new()
        .ws(url.as_str())
        .connect()
        .await
        .map_err(|e| anyhow!("Failed to connect to {url}: {e}"))?;
    info!(%url, "Connected");

    while let Some(frame) = stream.next().await {
        match frame? {
            Frame::Binary(raw) | Frame::Text(raw) => match view.apply(&raw) {
                Ok(()) => print_summary(&view),
                Err(e) => warn!(error = %e, "Discarding undecodable payload"),
            },
            Frame::Ping(raw) => stream.send(Message::Pong(raw)).await?,
            Frame::Close(reason) => {
                info!(?reason, "Server closed the stream");
                break;
            }
            _ => {}
        }
    }

    Ok(())
}

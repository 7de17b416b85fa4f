//! Shared fixtures: a throwaway HTTP upstream and matching settings

#![allow(dead_code)]

use chrono::NaiveDate;
use fx_report::alerting::{Alerter, RunSummary};
use fx_report::calendar;
use fx_report::config::Settings;
use fx_report::error::FxError;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// How long a silent reply keeps its connection open
pub const HANG: Duration = Duration::from_secs(60);

pub fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

/// Canned response for one path prefix
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
    /// Accept the request but never answer it
    pub hang: bool,
}

impl Reply {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: body.into(),
            hang: false,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: String::new(),
            hang: false,
        }
    }

    pub fn silent() -> Self {
        Self {
            hang: true,
            ..Self::status(200)
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

/// Local upstream serving canned replies and recording every request target
pub struct Upstream {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
}

impl Upstream {
    pub async fn start(routes: Vec<(&'static str, Reply)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let routes = Arc::new(routes);

        let log = requests.clone();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let routes = routes.clone();
                let log = log.clone();
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    let mut chunk = [0u8; 4096];
                    loop {
                        match stream.read(&mut chunk).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => buf.extend_from_slice(&chunk[..n]),
                        }
                        if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                            break;
                        }
                    }

                    let head = String::from_utf8_lossy(&buf).into_owned();
                    let target = head.split_whitespace().nth(1).unwrap_or("").to_string();
                    log.lock().unwrap().push(target.clone());

                    let reply = routes
                        .iter()
                        .find(|(prefix, _)| target.starts_with(prefix))
                        .map(|(_, reply)| reply.clone())
                        .unwrap_or_else(|| Reply::status(404));

                    if reply.hang {
                        tokio::time::sleep(HANG).await;
                        return;
                    }

                    let mut response = format!(
                        "HTTP/1.1 {} Canned\r\ncontent-length: {}\r\nconnection: close\r\n",
                        reply.status,
                        reply.body.len()
                    );
                    for (name, value) in &reply.headers {
                        response.push_str(&format!("{}: {}\r\n", name, value));
                    }
                    response.push_str("\r\n");
                    response.push_str(&reply.body);

                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        Self { addr, requests }
    }

    /// Number of requests whose target starts with `prefix`
    pub fn hits(&self, prefix: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.starts_with(prefix))
            .count()
    }

    pub fn settings(&self, output_dir: &Path) -> Settings {
        let mut settings = Settings::default();
        settings.ecb.endpoint = format!("http://{}/ecb/", self.addr);
        settings.ecb.symbols = vec!["USD".to_string(), "CZK".to_string()];
        settings.apilayer.endpoint = format!("http://{}/apilayer/", self.addr);
        settings.apilayer.api_key = Some("test-key".to_string());
        settings.apilayer.symbols = vec!["RSD".to_string(), "KZT".to_string()];
        settings.investing.endpoint = format!("http://{}/history", self.addr);
        settings.investing.search_endpoint = format!("http://{}/search", self.addr);
        settings.investing.instruments = [("EUR/RSD".to_string(), 1690)].into_iter().collect();
        settings.request_timeout_secs = 5;
        settings.output_dir = output_dir.to_path_buf();
        settings
    }
}

/// ECB `csvdata` payload for USD and CZK, August and September 2022
pub fn ecb_csv() -> String {
    let mut csv = String::from(
        "KEY,FREQ,CURRENCY,CURRENCY_DENOM,EXR_TYPE,EXR_SUFFIX,TIME_PERIOD,OBS_VALUE,OBS_STATUS\n",
    );
    for (symbol, base) in [("USD", 1.0), ("CZK", 24.5)] {
        for (n, day) in calendar::days(d(2022, 8, 1), d(2022, 9, 30)).enumerate() {
            csv.push_str(&format!(
                "EXR.D.{0}.EUR.SP00.A,D,{0},EUR,SP00,A,{1},{2},A\n",
                symbol,
                day,
                base + n as f64 * 0.001
            ));
        }
        for (n, month) in ["2022-08", "2022-09"].iter().enumerate() {
            csv.push_str(&format!(
                "EXR.M.{0}.EUR.SP00.A,M,{0},EUR,SP00,A,{1},{2},A\n",
                symbol,
                month,
                base + 0.01 - n as f64 * 0.02
            ));
        }
    }
    csv
}

pub const APILAYER_JSON: &str = r#"{
    "success": true,
    "timeseries": true,
    "base": "EUR",
    "rates": {
        "2022-08-01": {"RSD": 117.33, "KZT": 484.2},
        "2022-09-30": {"RSD": 117.31, "KZT": 471.9}
    }
}"#;

pub const INVESTING_JSON: &str = r#"{"t": [1659312000, 1661990400], "close": [117.28, 117.35], "s": "ok"}"#;

/// Records every notification and alert
#[derive(Default)]
pub struct RecordingAlerter {
    pub runs: Mutex<Vec<String>>,
    pub alerts: Mutex<Vec<String>>,
}

impl Alerter for RecordingAlerter {
    fn notify_run(&self, run: &RunSummary) {
        self.runs.lock().unwrap().push(run.describe());
    }

    fn alert(&self, run: &RunSummary, error: &FxError) {
        self.alerts
            .lock()
            .unwrap()
            .push(format!("{}: {}", run.describe(), error));
    }
}

/// True when `dir` is missing or holds no files at all
pub fn is_empty_dir(dir: &Path) -> bool {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.count() == 0,
        Err(_) => true,
    }
}

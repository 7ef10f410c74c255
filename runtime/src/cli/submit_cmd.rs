//! `fuzzscout submit`: post one JSON request to a running server.

use crate::cli::output;
use crate::client::{self, ResponseBody, SubmitOptions};
use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;

pub struct SubmitArgs {
    pub url: String,
    pub input: Option<PathBuf>,
    pub data: Option<String>,
    pub out: Option<PathBuf>,
    pub timeout_secs: u64,
    pub proxy: Option<String>,
    pub token: Option<String>,
    pub pretty: bool,
}

pub async fn run(args: SubmitArgs) -> Result<()> {
    let body = client::load_body(args.input.as_deref(), args.data.as_deref())?;
    let options = SubmitOptions {
        url: args.url,
        timeout: Duration::from_secs(args.timeout_secs),
        proxy: args.proxy,
        token: args.token,
    };

    let response = client::submit(&options, &body).await?;
    if let Some(path) = &args.out {
        response.save(path)?;
        if !output::is_quiet() {
            eprintln!("Response saved to {}", path.display());
        }
    }

    if output::is_json() {
        let body = match &response.body {
            ResponseBody::Json(v) => v.clone(),
            ResponseBody::Text(t) => serde_json::Value::String(t.clone()),
        };
        output::print_json(&serde_json::json!({
            "status": response.status,
            "reason": response.reason,
            "body": body,
        }));
    } else {
        println!("{}", response.render(args.pretty));
    }
    Ok(())
}

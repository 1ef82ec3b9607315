use breathfi_lib::{
    mean_bpm, now, replay, save, BpmOutcome, BpmService, ReplayFile, SqliteStore,
};
use serde_json::{json, Value};

use crate::cli::{BpmArgs, ReplayArgs};
use crate::CliResult;

const RESPONSE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn run_replay(args: ReplayArgs) -> CliResult<()> {
    let config = args.engine.config();
    let store = SqliteStore::open(&args.db)?;

    let windows = replay(&store, &config, args.step)?;
    for window in &windows {
        println!(
            "{}, fs = {:.2}, BPM = {}",
            window.window_end.format(RESPONSE_TIME_FORMAT),
            window.sampling_rate_hz,
            window.bpm
        );
    }

    match mean_bpm(&windows) {
        Some(mean) => println!("Mean BPM: {:.2} over {} windows", mean, windows.len()),
        None => println!("No window with CSI data to replay."),
    }

    if let Some(out) = args.out {
        save(ReplayFile::from_path(out)?, &windows)?;
    }
    Ok(())
}

/// One-shot query of the most recent window, ignoring the warm-up delay.
pub fn run_bpm(args: BpmArgs) -> CliResult<()> {
    let config = args.engine.config();
    let window_secs = config.window_secs;
    let service = BpmService::ready(SqliteStore::open(&args.db)?, config);

    let outcome = service.get_bpm(now())?;
    println!("{}", response(&outcome, window_secs));
    Ok(())
}

/// Renders an outcome in the shape of the HTTP API's `/bpm` response.
fn response(outcome: &BpmOutcome, window_secs: f64) -> Value {
    match outcome {
        BpmOutcome::NotReady => json!({
            "code": 503,
            "message": "BPM not ready. Please wait for the warm-up to finish.",
        }),
        BpmOutcome::InsufficientData => json!({
            "code": 204,
            "message": format!("No valid CSI data in the last {} seconds.", window_secs),
        }),
        BpmOutcome::Estimate(estimate) => json!({
            "code": 200,
            "data": {
                "bpm": estimate.bpm,
                "timestamp": estimate.timestamp.format(RESPONSE_TIME_FORMAT).to_string(),
                "sampling_rate": (estimate.sampling_rate_hz * 100.0).round() / 100.0,
            }
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use breathfi_lib::BpmEstimate;
    use chrono::NaiveDate;

    #[test]
    fn estimate_renders_like_http_response() {
        let timestamp = NaiveDate::from_ymd_opt(2025, 4, 10)
            .unwrap()
            .and_hms_micro_opt(21, 0, 3, 250_000)
            .unwrap();
        let outcome = BpmOutcome::Estimate(BpmEstimate {
            timestamp,
            sampling_rate_hz: 20.0 / 15.0,
            bpm: 15,
            median_bpm: 15.2,
            subcarriers_used: 57,
            frames_used: 20,
            frames_rejected: 0,
        });

        assert_eq!(
            response(&outcome, 20.0),
            json!({
                "code": 200,
                "data": {"bpm": 15, "timestamp": "2025-04-10 21:00:03", "sampling_rate": 1.33}
            })
        );
    }

    #[test]
    fn missing_data_and_warmup_carry_status_codes() {
        assert_eq!(response(&BpmOutcome::NotReady, 20.0)["code"], 503);
        let no_data = response(&BpmOutcome::InsufficientData, 20.0);
        assert_eq!(no_data["code"], 204);
        assert_eq!(
            no_data["message"],
            "No valid CSI data in the last 20 seconds."
        );
    }
}

use std::thread;
use std::time::Duration;

use chrono::{Datelike, Utc};
use tracing::{error, info};
use tracing_subscriber::fmt::time::ChronoLocal;

use gastobot::eligibility::mexico_city_offset;
use gastobot::jobs::{self, JobContext};
use gastobot::AppConfig;

const TICK: Duration = Duration::from_secs(60);

fn main() {
    tracing_subscriber::fmt()
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
        .with_target(true)
        .with_level(true)
        .init();
    dotenv::dotenv().ok();

    let cfg = match AppConfig::from_env() {
        Ok(cfg) => cfg,
        Err(err) => {
            error!("{err}");
            std::process::exit(1);
        }
    };
    let ctx = match JobContext::new(cfg) {
        Ok(ctx) => ctx,
        Err(err) => {
            error!("http client setup failed: {err}");
            std::process::exit(1);
        }
    };

    info!("gastobot scheduler started");

    // One blocking worker runs everything in sequence, so two jobs can never
    // touch the same mailbox folder or billing lot concurrently.
    let mut invoiced_month: Option<(i32, u32)> = None;
    loop {
        if let Err(err) = jobs::run_expense_job(&ctx) {
            error!("expense job failed: {err}");
        }

        let now = Utc::now().with_timezone(&mexico_city_offset());
        if jobs::invoicing_due(now, invoiced_month) {
            if let Err(err) = jobs::run_invoicing_job(&ctx) {
                error!("invoicing job failed: {err}");
            }
            // Mark the month even on failure; a failed run is re-attempted by
            // hand, not by the scheduler.
            invoiced_month = Some((now.year(), now.month()));
        }

        thread::sleep(TICK);
    }
}

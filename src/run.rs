use anyhow::{Context, Error};
use chrono::{DateTime, FixedOffset, Utc};
use std::path::PathBuf;

use crate::agent::prompt::{default_stages, AnalysisWindow};
use crate::config::AppConfig;
use crate::pipeline::{Backend, Pipeline, StageContext};
use crate::tools::market::MarketDataClient;
use crate::tools::posts::PostWriter;
use crate::tools::telegram::{PostNotice, TelegramNotifier};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub path: PathBuf,
    pub model: String,
}

/// One daily run: market data, generation, post file, approval request.
pub struct Job {
    pub pipeline: Pipeline,
    pub market: MarketDataClient,
    pub writer: PostWriter,
    pub notifier: Option<TelegramNotifier>,
    pub topic: Option<String>,
}

impl Job {
    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let pipeline = Pipeline::new(config.gemini_models.clone(), default_stages())
            .with_candidate_delay(config.candidate_delay())
            .with_call_timeout(config.call_timeout());
        let market = MarketDataClient::new(config.market.clone())?;
        let writer = PostWriter::new(config.posts.clone());
        let notifier = TelegramNotifier::new(config.telegram.clone())?;

        Ok(Self {
            pipeline,
            market,
            writer,
            notifier,
            topic: config.focus_topic().map(str::to_string),
        })
    }

    pub async fn run<B: Backend>(
        &self,
        backend: &B,
        now: DateTime<FixedOffset>,
    ) -> Result<RunReport, Error> {
        if let Some(topic) = self.topic.as_deref() {
            log::info!("focus topic: {}", topic);
        }

        log::info!("collecting market data...");
        let snapshot = self.market.fetch_snapshot().await;

        let context = StageContext {
            source_data: snapshot.render(),
            topic: self.topic.clone(),
            window: AnalysisWindow::for_date(now.date_naive()),
            timestamp: now,
        };

        log::info!("generating post...");
        let artifact = self
            .pipeline
            .run(backend, &context)
            .await
            .context("Generating post")?;

        let path = self.writer.write(&now, &artifact.text)?;

        if let Some(notifier) = &self.notifier {
            let file_name = path
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_default();
            notifier
                .notify(&PostNotice {
                    file_name: &file_name,
                    topic: self.topic.as_deref(),
                    model: &artifact.model,
                })
                .await;
        }

        Ok(RunReport {
            path,
            model: artifact.model,
        })
    }
}

/// Current time at the given whole-hour UTC offset.
pub fn local_now(utc_offset_hours: i32) -> Result<DateTime<FixedOffset>, Error> {
    let offset = utc_offset_hours
        .checked_mul(3600)
        .and_then(FixedOffset::east_opt)
        .with_context(|| format!("Invalid UTC offset: {} hours", utc_offset_hours))?;
    Ok(Utc::now().with_timezone(&offset))
}

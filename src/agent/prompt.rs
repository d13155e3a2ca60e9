use chrono::{Datelike, NaiveDate, Weekday};

use crate::pipeline::{GenerationRequest, Stage, StageInput};

pub const DEFAULT_TOPIC: &str = "Daily US market briefing";

pub const ANALYST_PREAMBLE: &str = "You are 'The Rich Way', a senior US equity market analyst who \
writes a widely read investing blog. You explain market moves clearly, connect index moves to \
each other, and never invent numbers that are not in the data you are given.";

pub const EDITOR_PREAMBLE: &str = "You are the managing editor of 'The Rich Way' investing blog. \
You tighten drafts, fix factual slips against the source data, and keep the author's voice.";

/// Which trading session a post should cover, keyed on the local weekday.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisWindow {
    WeekendAndFriday,
    PreviousSession,
    LatestClose,
}

impl AnalysisWindow {
    pub fn for_date(date: NaiveDate) -> Self {
        match date.weekday() {
            Weekday::Mon => AnalysisWindow::WeekendAndFriday,
            Weekday::Tue | Weekday::Wed | Weekday::Thu | Weekday::Fri => {
                AnalysisWindow::PreviousSession
            }
            Weekday::Sat | Weekday::Sun => AnalysisWindow::LatestClose,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AnalysisWindow::WeekendAndFriday => {
                "the weekend and Friday's US close (Friday's session plus weekend news)"
            }
            AnalysisWindow::PreviousSession => {
                "the previous US trading day and overnight moves"
            }
            AnalysisWindow::LatestClose => "the most recent US market close",
        }
    }
}

pub fn default_stages() -> Vec<Stage> {
    vec![
        Stage {
            name: "analyst",
            build: build_analyst_request,
        },
        Stage {
            name: "editor",
            build: build_editor_request,
        },
    ]
}

fn topic_of(input: &StageInput<'_>) -> String {
    input
        .context
        .topic
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_TOPIC)
        .to_string()
}

pub fn build_analyst_request(input: &StageInput<'_>) -> GenerationRequest {
    let topic = topic_of(input);
    let timestamp = input.context.timestamp.format("%Y-%m-%d %H:%M:%S %z");
    let focus = if topic == DEFAULT_TOPIC {
        "Write today's overall US market briefing.".to_string()
    } else {
        format!(
            "Use the data for context, but focus the analysis on '{}' and reflect it in the title.",
            topic
        )
    };

    let prompt = format!(
        r#"# Data
{data}

# Topic
{topic}

# Analysis window
Cover {window}.

# Task
1. {focus}
2. Explain how the indices moved relative to each other and what that says about sentiment.
3. Structure: introduction (market mood), body (index and news analysis), conclusion (one-line summary).
4. Keep it readable and a little witty; explain jargon in plain words.
5. End the body with the line: Analyzed by {model}

# Output format
Return only the post, starting with this front matter:
---
layout: post
title: "<a title you write, with one emoji>"
date: {timestamp}
categories: [Investing, US Market]
published: false
---
"#,
        data = input.prior.trim(),
        topic = topic,
        window = input.context.window.label(),
        focus = focus,
        model = input.model,
        timestamp = timestamp,
    );

    GenerationRequest {
        preamble: ANALYST_PREAMBLE.to_string(),
        prompt,
    }
}

pub fn build_editor_request(input: &StageInput<'_>) -> GenerationRequest {
    let prompt = format!(
        r#"Revise the draft blog post below.

# Rules
- Keep the front matter block exactly as it is, except that you may improve the title.
- Check every number against the source data and correct anything that does not match.
- Cut repetition, keep the structure, keep the "Analyzed by" line.
- Return the revised post as markdown only, with no commentary and no code fences.

# Source data
{data}

# Draft
{draft}
"#,
        data = input.context.source_data.trim(),
        draft = input.prior,
    );

    GenerationRequest {
        preamble: EDITOR_PREAMBLE.to_string(),
        prompt,
    }
}

//! Renders backend results into reply text and article cards.

use super::api::{Directions, Leg, SearchResult, ServiceList, ServiceSummary, Step};
use crate::wechat::Article;
use std::fmt::Write;

const TRAVEL_MODE_WALKING: &str = "WALKING";
const TRAVEL_MODE_TRANSIT: &str = "TRANSIT";

pub fn search_articles(results: &[SearchResult], limit: usize, pic_url: &str) -> Vec<Article> {
    results
        .iter()
        .take(limit)
        .map(|result| Article {
            title: result.title.clone(),
            description: result.abstract_text.clone(),
            pic_url: pic_url.to_string(),
            url: result.url.clone(),
        })
        .collect()
}

/// Numbered `i. name: state` list, one line per service.
pub fn service_list(list: &ServiceList) -> String {
    let total = if list.meta.total_count == 0 {
        list.objects.len() as u64
    } else {
        list.meta.total_count
    };
    let mut out = format!("共有{total}个服务。\n");
    for (i, service) in list.objects.iter().enumerate() {
        let _ = writeln!(out, "{}. {}: {}", i + 1, service.name, service.state);
    }
    out
}

pub fn service_status(service: &ServiceSummary) -> String {
    format!("{}: {}", service.name, service.state)
}

/// Renders the first leg of the first route, or `None` when there is none.
pub fn directions(directions: &Directions) -> Option<String> {
    let leg = directions.routes.first()?.legs.first()?;
    Some(leg_summary(leg))
}

fn leg_summary(leg: &Leg) -> String {
    let mut out = format!(
        "路线总长{}，预计用时{}\n",
        leg.distance.text, leg.duration.text
    );
    if !leg.start_address.is_empty() {
        let _ = writeln!(out, "◇ {}", leg.start_address);
    }
    for step in &leg.steps {
        render_step(&mut out, step);
    }
    let _ = writeln!(out, "◇ {}", leg.end_address);
    out
}

fn render_step(out: &mut String, step: &Step) {
    match (step.travel_mode.as_str(), step.transit_details.as_ref()) {
        (TRAVEL_MODE_TRANSIT, Some(details)) => {
            let _ = writeln!(out, "◇ {}", details.departure_stop.name);
            let line = if details.line.short_name.is_empty() {
                details.line.name.as_str()
            } else {
                details.line.short_name.as_str()
            };
            let _ = writeln!(
                out,
                "    {} {} {}站",
                step.instructions, line, details.num_stops
            );
            let _ = writeln!(out, "    {} {}", step.distance.text, step.duration.text);
            let _ = writeln!(out, "◇ {}", details.arrival_stop.name);
        }
        (mode, _) => {
            if mode != TRAVEL_MODE_WALKING {
                tracing::debug!("rendering {mode} step as a plain instruction");
            }
            let _ = writeln!(out, "    {}", step.instructions);
            let _ = writeln!(out, "    {} {}", step.distance.text, step.duration.text);
        }
    }
}

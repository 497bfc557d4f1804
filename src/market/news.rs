//! Market news handler.
//!
//! Scrapes the news site's equities category page and extracts articles
//! with a chain of selector strategies, most specific first. Extraction is
//! best-effort: an empty article list is a valid degraded output, and the
//! whole scrape races an outer timeout so the caller's response ceiling
//! holds even if the per-attempt timeout is misconfigured.

use std::collections::HashSet;
use std::time::Instant;

use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::cache::CacheKind;
use crate::config::Settings;
use crate::error::FetchError;
use crate::fetch::{error_detail, FetchOptions, Fetcher};

use super::{envelope, fallback};

/// Hard cap on extracted articles.
const MAX_ARTICLES: usize = 10;

/// Base used to absolutize relative article links.
const NEWS_BASE: &str = "https://nairametrics.com";

/// Article container selectors, tried in priority order. The first
/// selector that yields any articles wins.
const ARTICLE_SELECTORS: &[&str] = &[
    ".jeg_heroblock article.jeg_post",
    "article.jeg_post",
    ".jeg_post",
    ".post-item",
    ".post",
    "article",
    ".entry",
    ".listing-item",
];

#[derive(Debug, Clone, Serialize)]
pub struct Article {
    pub title: String,
    pub link: String,
    pub date: String,
    pub category: String,
    pub author: String,
    pub source: String,
}

/// Fetch and shape the news envelope. Never fails.
pub async fn fetch_news(fetcher: &Fetcher, settings: &Settings) -> Value {
    let started = Instant::now();

    match tokio::time::timeout(settings.news_outer_timeout, scrape(fetcher, settings)).await {
        Ok(Ok((articles, from_cache))) => {
            let data: Vec<Value> = articles.iter().map(article_json).collect();
            envelope(
                if from_cache { "cache" } else { "live" },
                data,
                started,
                None,
            )
        }
        Ok(Err(err)) => {
            warn!("news scrape failed ({}), serving fallback", err);
            let mut body = envelope(
                "fallback",
                fallback::news_seed(),
                started,
                Some(json!("Using seed data - scrape failed")),
            );
            body["error"] = error_detail(&err);
            body
        }
        Err(_) => {
            warn!("news scrape exceeded outer timeout, serving fallback");
            envelope(
                "fallback",
                fallback::news_seed(),
                started,
                Some(json!("Using seed data - scrape timed out")),
            )
        }
    }
}

async fn scrape(
    fetcher: &Fetcher,
    settings: &Settings,
) -> Result<(Vec<Article>, bool), FetchError> {
    let options = FetchOptions {
        cache: Some((CacheKind::News, "equities".to_string())),
        timeout: Some(settings.news_timeout),
        referer: Some(format!("{}/", NEWS_BASE)),
        ..Default::default()
    };
    let fetched = fetcher
        .fetch(&settings.news_url, &options, settings.news_retries)
        .await?;
    let articles = parse_articles(&fetched.body);
    Ok((articles, fetched.from_cache))
}

fn article_json(article: &Article) -> Value {
    json!({
        "title": article.title,
        "link": article.link,
        "date": article.date,
        "category": article.category,
        "author": article.author,
        "source": article.source,
    })
}

fn sel(selector: &str) -> Option<Selector> {
    Selector::parse(selector).ok()
}

fn first_text(element: &ElementRef, selectors: &[&str]) -> Option<String> {
    for s in selectors {
        if let Some(selector) = sel(s) {
            if let Some(found) = element.select(&selector).next() {
                let text = found.text().collect::<String>().trim().to_string();
                if !text.is_empty() {
                    return Some(text);
                }
            }
        }
    }
    None
}

fn first_href(element: &ElementRef, selectors: &[&str]) -> Option<String> {
    for s in selectors {
        if let Some(selector) = sel(s) {
            if let Some(found) = element.select(&selector).next() {
                if let Some(href) = found.value().attr("href") {
                    return Some(href.to_string());
                }
            }
        }
    }
    None
}

fn absolutize(link: &str) -> String {
    if link.starts_with("http") {
        link.to_string()
    } else {
        format!("{}{}", NEWS_BASE, link)
    }
}

/// Extract articles from the category page HTML.
pub fn parse_articles(html: &str) -> Vec<Article> {
    let document = Html::parse_document(html);
    let mut articles = Vec::new();

    for container in ARTICLE_SELECTORS {
        let Some(selector) = sel(container) else {
            continue;
        };
        for element in document.select(&selector) {
            let title = match first_text(
                &element,
                &[
                    ".jeg_post_title a",
                    "h2 a, h3 a, .post-title, .entry-title, .title",
                    "a",
                ],
            ) {
                Some(t) => t,
                None => continue,
            };
            let link = match first_href(
                &element,
                &[
                    ".jeg_post_title a",
                    "h2 a, h3 a, .post-title a, .entry-title a, .title a",
                    "a",
                ],
            ) {
                Some(l) => l,
                None => continue,
            };
            // Skip nav/stub links that only look like articles.
            if title.len() <= 10 {
                continue;
            }

            let date = first_text(
                &element,
                &[".jeg_meta_date a", ".post-date, .entry-date, .date, time"],
            )
            .unwrap_or_else(|| "Date not available".to_string());
            let category = first_text(&element, &[".jeg_post_category a"])
                .unwrap_or_else(|| "Uncategorized".to_string());
            let author = first_text(&element, &[".jeg_meta_author a"])
                .unwrap_or_else(|| "Unknown Author".to_string());

            articles.push(Article {
                title,
                link: absolutize(&link),
                date: date.split_whitespace().collect::<Vec<_>>().join(" "),
                category,
                author,
                source: "Nairametrics".to_string(),
            });
        }

        if !articles.is_empty() {
            debug!(
                "extracted {} articles with selector {}",
                articles.len(),
                container
            );
            break;
        }
    }

    if articles.is_empty() {
        articles = bare_link_fallback(&document);
    }

    dedup_by_link(articles)
}

/// Last-resort strategy: any link long enough to be an article headline.
fn bare_link_fallback(document: &Html) -> Vec<Article> {
    let Some(anchor) = sel("a") else {
        return Vec::new();
    };
    let mut articles = Vec::new();
    for element in document.select(&anchor) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let text = element.text().collect::<String>().trim().to_string();
        if text.len() > 20
            && href.contains('/')
            && !href.contains("javascript:")
            && !href.contains("mailto:")
        {
            articles.push(Article {
                title: text,
                link: absolutize(href),
                date: "Date not available".to_string(),
                category: "Uncategorized".to_string(),
                author: "Unknown Author".to_string(),
                source: "Nairametrics".to_string(),
            });
        }
    }
    articles
}

fn dedup_by_link(articles: Vec<Article>) -> Vec<Article> {
    let mut seen = HashSet::new();
    articles
        .into_iter()
        .filter(|a| seen.insert(a.link.clone()))
        .take(MAX_ARTICLES)
        .collect()
}

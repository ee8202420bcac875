//! Heuristic scoring: recommendations, demand forecast, overdue risk.
//!
//! Read-only. The scoring functions are pure over a catalog snapshot and a
//! loan history so they can be checked rule by rule; `AnalyticsService`
//! fetches the snapshots from the store.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::{
    config::AnalyticsConfig,
    error::AppResult,
    models::{
        analytics::{BookRecommendation, DemandForecast, OverduePrediction, RiskLevel},
        Actor, Book, Loan, LoanFilter, LoanStatus,
    },
    repository::SharedStore,
};

use super::{clock::SharedClock, loan_state::days_until};

const GENRE_WEIGHT: f64 = 0.5;
const TAG_WEIGHT: f64 = 0.2;
const FALLBACK_SCORE: f64 = 0.5;
const MAX_REASON_TAGS: usize = 2;

/// Content-based recommendations from genres and tags of books the user has returned.
///
/// `catalog` must be in catalog order; ties keep that order.
pub fn recommend(catalog: &[Book], history: &[Loan], limit: usize) -> Vec<BookRecommendation> {
    let read: HashSet<Uuid> = history
        .iter()
        .filter(|l| l.status == LoanStatus::Returned)
        .map(|l| l.book_id)
        .collect();

    if read.is_empty() {
        let mut newest: Vec<&Book> = catalog.iter().collect();
        // Stable, so equal timestamps keep catalog order
        newest.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        return newest
            .into_iter()
            .take(limit)
            .map(|book| recommendation(book, FALLBACK_SCORE, "Popular book".to_string()))
            .collect();
    }

    let mut user_genres: HashSet<&str> = HashSet::new();
    let mut user_tags: HashSet<&str> = HashSet::new();
    for book in catalog.iter().filter(|b| read.contains(&b.id)) {
        user_genres.insert(book.genre.as_str());
        user_tags.extend(book.tags.iter().map(String::as_str));
    }

    let mut scored: Vec<BookRecommendation> = catalog
        .iter()
        .filter(|b| !read.contains(&b.id))
        .filter_map(|book| {
            let mut score = 0.0;
            let mut reasons = Vec::new();

            if user_genres.contains(book.genre.as_str()) {
                score += GENRE_WEIGHT;
                reasons.push(format!("Similar genre: {}", book.genre));
            }

            let mut seen = HashSet::new();
            let common: Vec<&str> = book
                .tags
                .iter()
                .map(String::as_str)
                .filter(|t| user_tags.contains(t) && seen.insert(*t))
                .collect();
            if !common.is_empty() {
                score += common.len() as f64 * TAG_WEIGHT;
                let shown: Vec<&str> = common.iter().take(MAX_REASON_TAGS).copied().collect();
                reasons.push(format!("Common tags: {}", shown.join(", ")));
            }

            (score > 0.0).then(|| recommendation(book, score, reasons.join("; ")))
        })
        .collect();

    scored.sort_by(|a, b| b.similarity_score.total_cmp(&a.similarity_score));
    scored.truncate(limit);
    scored
}

fn recommendation(book: &Book, score: f64, reason: String) -> BookRecommendation {
    BookRecommendation {
        book_id: book.id,
        title: book.title.clone(),
        author: book.author.clone(),
        similarity_score: score,
        reason,
    }
}

/// Demand over the next window: twice the loans seen in the trailing window
pub fn forecast_demand(
    catalog: &[Book],
    loans: &[Loan],
    now: DateTime<Utc>,
    window: Duration,
    top_n: usize,
) -> Vec<DemandForecast> {
    let since = now - window;
    let mut recent: HashMap<Uuid, u32> = HashMap::new();
    for loan in loans.iter().filter(|l| l.borrowed_at >= since) {
        *recent.entry(loan.book_id).or_default() += 1;
    }

    let mut forecasts: Vec<DemandForecast> = catalog
        .iter()
        .map(|book| {
            let count = recent.get(&book.id).copied().unwrap_or(0);
            DemandForecast {
                book_id: book.id,
                title: book.title.clone(),
                recent_loans: count,
                predicted_demand: count * 2,
                confidence: (0.5 + f64::from(count) * 0.1).min(0.9),
            }
        })
        .collect();

    forecasts.sort_by(|a, b| b.predicted_demand.cmp(&a.predicted_demand));
    forecasts.truncate(top_n);
    forecasts
}

/// Probability that a loan ends up overdue, from days left and the user's record
pub fn overdue_probability(days_until_due: i64, overdue_rate: f64) -> f64 {
    match days_until_due {
        d if d <= 0 => 0.95,
        1..=2 => 0.7 + 0.2 * overdue_rate,
        3..=5 => 0.4 + 0.3 * overdue_rate,
        _ => overdue_rate,
    }
}

/// Risk for every `borrowed` loan, highest first
pub fn overdue_risk(catalog: &[Book], loans: &[Loan], now: DateTime<Utc>) -> Vec<OverduePrediction> {
    let titles: HashMap<Uuid, &str> = catalog.iter().map(|b| (b.id, b.title.as_str())).collect();

    // (total loans, late loans) per user
    let mut records: HashMap<Uuid, (u32, u32)> = HashMap::new();
    for loan in loans {
        let entry = records.entry(loan.user_id).or_default();
        entry.0 += 1;
        if loan.was_late() {
            entry.1 += 1;
        }
    }

    let mut predictions: Vec<OverduePrediction> = loans
        .iter()
        .filter(|l| l.status == LoanStatus::Borrowed)
        .filter_map(|loan| {
            // Loans on books missing from the catalog are skipped
            let title = titles.get(&loan.book_id)?;
            let (total, late) = records.get(&loan.user_id).copied().unwrap_or((0, 0));
            let overdue_rate = f64::from(late) / f64::from(total.max(1));
            let days_until_due = days_until(loan.due_at, now);
            let probability = overdue_probability(days_until_due, overdue_rate);

            Some(OverduePrediction {
                loan_id: loan.id,
                user_id: loan.user_id,
                book_id: loan.book_id,
                book_title: title.to_string(),
                days_until_due,
                probability,
                risk_level: RiskLevel::from_probability(probability),
            })
        })
        .collect();

    predictions.sort_by(|a, b| b.probability.total_cmp(&a.probability));
    predictions
}

#[derive(Clone)]
pub struct AnalyticsService {
    store: SharedStore,
    clock: SharedClock,
    config: AnalyticsConfig,
}

impl AnalyticsService {
    pub fn new(store: SharedStore, clock: SharedClock, config: AnalyticsConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    pub async fn recommend(&self, user_id: Uuid, limit: Option<usize>) -> AppResult<Vec<BookRecommendation>> {
        let limit = limit.unwrap_or(self.config.default_recommendation_limit);
        let history = self.store.query_loans(&LoanFilter::for_user(user_id)).await?;
        let catalog = self.store.list_books().await?;
        Ok(recommend(&catalog, &history, limit))
    }

    pub async fn forecast_demand(&self, actor: Actor) -> AppResult<Vec<DemandForecast>> {
        actor.require_librarian()?;
        let now = self.clock.now();
        let window = Duration::days(self.config.demand_window_days);
        let recent = LoanFilter {
            borrowed_since: Some(now - window),
            ..Default::default()
        };
        let loans = self.store.query_loans(&recent).await?;
        let catalog = self.store.list_books().await?;
        Ok(forecast_demand(&catalog, &loans, now, window, self.config.demand_top_n))
    }

    pub async fn overdue_risk(&self, actor: Actor) -> AppResult<Vec<OverduePrediction>> {
        actor.require_librarian()?;
        let loans = self.store.query_loans(&LoanFilter::default()).await?;
        let catalog = self.store.list_books().await?;
        Ok(overdue_risk(&catalog, &loans, self.clock.now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewBook;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn returned(user: Uuid, book: &Book, borrowed_at: DateTime<Utc>, days_late: i64) -> Loan {
        let mut loan = Loan::open(user, book.id, borrowed_at, Duration::days(14));
        loan.status = LoanStatus::Returned;
        loan.returned_at = Some(loan.due_at + Duration::days(days_late));
        loan
    }

    #[test]
    fn test_recommend_without_history_lists_newest() {
        let now = Utc::now();
        let catalog: Vec<Book> = vec![
            NewBook::new("A", "Drama", 1).created_at(now - Duration::days(3)).into_book(),
            NewBook::new("B", "Drama", 1).created_at(now - Duration::days(2)).into_book(),
            NewBook::new("C", "Drama", 1).created_at(now - Duration::days(1)).into_book(),
        ];

        let recs = recommend(&catalog, &[], 5);
        let titles: Vec<&str> = recs.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["C", "B", "A"]);
        assert!(recs.iter().all(|r| close(r.similarity_score, 0.5) && r.reason == "Popular book"));

        assert_eq!(recommend(&catalog, &[], 2).len(), 2);
    }

    #[test]
    fn test_active_loans_are_not_history() {
        let catalog = vec![NewBook::new("A", "Drama", 1).into_book()];
        let active = Loan::open(Uuid::new_v4(), catalog[0].id, Utc::now(), Duration::days(14));
        let recs = recommend(&catalog, &[active], 5);
        assert_eq!(recs[0].reason, "Popular book");
    }

    #[test]
    fn test_recommend_genre_and_tag_score() {
        let user = Uuid::new_v4();
        let read = NewBook::new("Read", "Sci-Fi", 1).with_tags(&["a", "b"]).into_book();
        let x = NewBook::new("X", "Sci-Fi", 1).with_tags(&["b", "c"]).into_book();
        let y = NewBook::new("Y", "Romance", 1).with_tags(&["a", "b"]).into_book();
        let z = NewBook::new("Z", "Romance", 1).with_tags(&["q"]).into_book();
        let history = vec![returned(user, &read, Utc::now() - Duration::days(30), 0)];
        let catalog = vec![read, x, y, z];

        let recs = recommend(&catalog, &history, 10);
        assert_eq!(recs.len(), 2);

        assert_eq!(recs[0].title, "X");
        assert!(close(recs[0].similarity_score, 0.7));
        assert_eq!(recs[0].reason, "Similar genre: Sci-Fi; Common tags: b");

        assert_eq!(recs[1].title, "Y");
        assert!(close(recs[1].similarity_score, 0.4));
        assert_eq!(recs[1].reason, "Common tags: a, b");
    }

    #[test]
    fn test_recommend_reason_shows_two_tags_and_ties_keep_catalog_order() {
        let user = Uuid::new_v4();
        let read = NewBook::new("Read", "Poetry", 1).with_tags(&["a", "b", "c"]).into_book();
        let first = NewBook::new("First", "Essay", 1).with_tags(&["a", "b", "c"]).into_book();
        let second = NewBook::new("Second", "Essay", 1).with_tags(&["c", "b", "a"]).into_book();
        let history = vec![returned(user, &read, Utc::now(), 0)];
        let catalog = vec![read, first, second];

        let recs = recommend(&catalog, &history, 10);
        assert_eq!(recs[0].title, "First");
        assert_eq!(recs[1].title, "Second");
        assert!(close(recs[0].similarity_score, 0.6));
        assert_eq!(recs[0].reason, "Common tags: a, b");
        assert_eq!(recs[1].reason, "Common tags: c, b");
    }

    #[test]
    fn test_forecast_demand() {
        let now = Utc::now();
        let hot = NewBook::new("Hot", "Drama", 5).into_book();
        let cold = NewBook::new("Cold", "Drama", 5).into_book();
        let user = Uuid::new_v4();
        let loans = vec![
            Loan::open(user, hot.id, now - Duration::days(1), Duration::days(14)),
            Loan::open(user, hot.id, now - Duration::days(10), Duration::days(14)),
            Loan::open(user, hot.id, now - Duration::days(45), Duration::days(14)),
        ];
        let catalog = vec![cold, hot];

        let forecasts = forecast_demand(&catalog, &loans, now, Duration::days(30), 20);
        assert_eq!(forecasts[0].title, "Hot");
        assert_eq!(forecasts[0].recent_loans, 2);
        assert_eq!(forecasts[0].predicted_demand, 4);
        assert!(close(forecasts[0].confidence, 0.7));
        assert_eq!(forecasts[1].title, "Cold");
        assert_eq!(forecasts[1].predicted_demand, 0);

        let json = serde_json::to_value(&forecasts[0]).unwrap();
        assert_eq!(json["predicted_demand"], serde_json::json!(4));
        assert!(close(forecasts[1].confidence, 0.5));
    }

    #[test]
    fn test_forecast_confidence_caps_and_truncates() {
        let now = Utc::now();
        let book = NewBook::new("Busy", "Drama", 50).into_book();
        let loans: Vec<Loan> = (0..8)
            .map(|_| Loan::open(Uuid::new_v4(), book.id, now, Duration::days(14)))
            .collect();
        let mut catalog = vec![book];
        catalog.extend((0..30).map(|i| NewBook::new(&format!("B{}", i), "Drama", 1).into_book()));

        let forecasts = forecast_demand(&catalog, &loans, now, Duration::days(30), 20);
        assert_eq!(forecasts.len(), 20);
        assert!(close(forecasts[0].confidence, 0.9));
        assert_eq!(forecasts[0].predicted_demand, 16);
        // Zero-demand ties keep catalog order
        assert_eq!(forecasts[1].title, "B0");
    }

    #[test]
    fn test_overdue_probability_bands() {
        assert!(close(overdue_probability(-3, 0.0), 0.95));
        assert!(close(overdue_probability(0, 1.0), 0.95));
        assert!(close(overdue_probability(1, 0.5), 0.8));
        assert!(close(overdue_probability(2, 0.0), 0.7));
        assert!(close(overdue_probability(3, 1.0), 0.7));
        assert!(close(overdue_probability(5, 0.0), 0.4));
        assert!(close(overdue_probability(6, 0.25), 0.25));
    }

    #[test]
    fn test_risk_levels() {
        assert_eq!(RiskLevel::from_probability(0.95), RiskLevel::High);
        assert_eq!(RiskLevel::from_probability(0.7), RiskLevel::High);
        assert_eq!(RiskLevel::from_probability(0.55), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_probability(0.4), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_probability(0.1), RiskLevel::Low);
    }

    #[test]
    fn test_overdue_risk_uses_user_history() {
        let now = Utc::now();
        let book = NewBook::new("Risky", "Drama", 3).into_book();
        let user = Uuid::new_v4();

        // One late return out of four loans: rate 0.25
        let late = returned(user, &book, now - Duration::days(60), 3);
        let on_time = returned(user, &book, now - Duration::days(40), 0);
        let past_due = Loan::open(user, book.id, now - Duration::days(15), Duration::days(14));
        let current = Loan::open(
            user,
            book.id,
            now - Duration::days(10) - Duration::hours(1),
            Duration::days(14),
        );

        let loans = vec![late, on_time, past_due.clone(), current.clone()];
        let predictions = overdue_risk(&[book], &loans, now);

        assert_eq!(predictions.len(), 2);
        assert_eq!(predictions[0].loan_id, past_due.id);
        assert!(close(predictions[0].probability, 0.95));
        assert_eq!(predictions[0].risk_level, RiskLevel::High);

        // Due in a bit under 4 days: floor gives 3
        assert_eq!(predictions[1].loan_id, current.id);
        assert_eq!(predictions[1].days_until_due, 3);
        assert!(close(predictions[1].probability, 0.4 + 0.3 * 0.25));
        assert_eq!(predictions[1].risk_level, RiskLevel::Medium);
    }
}

//! Heuristic scoring report types

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct BookRecommendation {
    pub book_id: Uuid,
    pub title: String,
    pub author: String,
    pub similarity_score: f64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct DemandForecast {
    pub book_id: Uuid,
    pub title: String,
    pub recent_loans: u32,
    pub predicted_demand: u32,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub enum RiskLevel {
    High,
    Medium,
    Low,
}

impl RiskLevel {
    pub fn from_probability(probability: f64) -> Self {
        if probability >= 0.7 {
            RiskLevel::High
        } else if probability >= 0.4 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct OverduePrediction {
    pub loan_id: Uuid,
    pub user_id: Uuid,
    pub book_id: Uuid,
    pub book_title: String,
    pub days_until_due: i64,
    pub probability: f64,
    pub risk_level: RiskLevel,
}

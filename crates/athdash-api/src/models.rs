// Feature payload models
//
// Bodies carried in the `data` field of the `{ success, data, message }`
// envelope. Fields use `#[serde(default)]` wherever the server omits values
// for members who have not filled in a section yet.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ── Profile ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitSystem {
    #[default]
    Metric,
    Imperial,
}

/// Member profile and body composition. Values are stored in metric units;
/// `units` is only the member's display preference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileData {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub height_cm: Option<f64>,
    #[serde(default)]
    pub weight_kg: Option<f64>,
    #[serde(default)]
    pub body_fat_pct: Option<f64>,
    #[serde(default)]
    pub units: UnitSystem,
}

impl ProfileData {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_owned()
    }
}

// ── Workouts ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intensity {
    Low,
    #[default]
    Moderate,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exercise {
    pub name: String,
    #[serde(default)]
    pub sets: u32,
    #[serde(default)]
    pub reps: u32,
    #[serde(default)]
    pub weight_kg: Option<f64>,
}

/// One logged workout. `id` is assigned by the server on save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub date: NaiveDate,
    #[serde(rename = "type")]
    pub workout_type: String,
    pub duration_minutes: u32,
    #[serde(default)]
    pub intensity: Intensity,
    #[serde(default)]
    pub exercises: Vec<Exercise>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkoutLog {
    #[serde(default)]
    pub workouts: Vec<WorkoutEntry>,
    /// Total on the server; may exceed `workouts.len()` when paged.
    #[serde(default)]
    pub total: u32,
}

impl WorkoutLog {
    pub fn total_minutes(&self) -> u32 {
        self.workouts.iter().map(|w| w.duration_minutes).sum()
    }

    /// Most recent entry by date.
    pub fn latest(&self) -> Option<&WorkoutEntry> {
        self.workouts.iter().max_by_key(|w| w.date)
    }
}

// ── Training persona ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperienceLevel {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalStatus {
    #[default]
    Active,
    Completed,
    Abandoned,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingGoal {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub target_date: Option<NaiveDate>,
    /// Percent complete, 0-100.
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub status: GoalStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingPersona {
    #[serde(default)]
    pub level: ExperienceLevel,
    #[serde(default)]
    pub goals: Vec<TrainingGoal>,
    #[serde(default)]
    pub preferred_days: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl TrainingPersona {
    pub fn active_goals(&self) -> impl Iterator<Item = &TrainingGoal> {
        self.goals
            .iter()
            .filter(|goal| goal.status == GoalStatus::Active)
    }
}

// ── Overview ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverviewData {
    #[serde(default)]
    pub workouts_this_week: u32,
    #[serde(default)]
    pub total_workouts: u32,
    #[serde(default)]
    pub current_streak_days: u32,
    #[serde(default)]
    pub last_workout: Option<NaiveDate>,
    #[serde(default)]
    pub active_goals: u32,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn workout_entry_uses_wire_names() {
        let entry: WorkoutEntry = serde_json::from_value(json!({
            "date": "2024-03-02",
            "type": "strength",
            "duration_minutes": 45,
            "intensity": "high",
            "exercises": [{ "name": "Squat", "sets": 5, "reps": 5, "weight_kg": 100.0 }]
        }))
        .unwrap();

        assert_eq!(entry.id, None);
        assert_eq!(entry.workout_type, "strength");
        assert_eq!(entry.intensity, Intensity::High);
        assert_eq!(entry.exercises[0].weight_kg, Some(100.0));

        let back = serde_json::to_value(&entry).unwrap();
        assert_eq!(back["type"], "strength");
        assert!(back.get("id").is_none());
    }

    #[test]
    fn sparse_profile_fills_defaults() {
        let profile: ProfileData =
            serde_json::from_value(json!({ "first_name": "Casey" })).unwrap();
        assert_eq!(profile.display_name(), "Casey");
        assert_eq!(profile.units, UnitSystem::Metric);
        assert_eq!(profile.weight_kg, None);
    }

    #[test]
    fn log_and_persona_helpers() {
        let log: WorkoutLog = serde_json::from_value(json!({
            "workouts": [
                { "date": "2024-03-01", "type": "run", "duration_minutes": 30 },
                { "date": "2024-03-04", "type": "swim", "duration_minutes": 40 }
            ],
            "total": 12
        }))
        .unwrap();
        assert_eq!(log.total_minutes(), 70);
        assert_eq!(log.latest().unwrap().workout_type, "swim");

        let persona: TrainingPersona = serde_json::from_value(json!({
            "level": "intermediate",
            "goals": [
                { "id": "g1", "title": "Sub-25 5k", "progress": 60 },
                { "id": "g2", "title": "First pull-up", "status": "completed", "progress": 100 }
            ]
        }))
        .unwrap();
        let active: Vec<_> = persona.active_goals().map(|g| g.id.as_str()).collect();
        assert_eq!(active, vec!["g1"]);
    }
}

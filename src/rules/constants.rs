//! Thresholds of the daily rules. Days are calendar days.

// Sanitary
pub const TREATMENT_RETURN_LOOKAHEAD_DAYS: i64 = 15;
pub const VACCINATION_LOOKAHEAD_DAYS: i64 = 30;

// Reproduction
pub const GESTATION_DAYS: i64 = 315;
pub const BIRTH_LOOKAHEAD_DAYS: i64 = 30;
pub const DIAGNOSIS_OVERDUE_DAYS: i64 = 90;
pub const BREEDING_MIN_AGE_MONTHS: u32 = 18;
pub const EMPTY_FEMALE_DAYS: i64 = 180;

// Production
pub const RECENT_YIELD_DAYS: i64 = 7;
pub const HISTORICAL_YIELD_DAYS: i64 = 30;
pub const MIN_RECENT_SAMPLES: usize = 3;
pub const MIN_HISTORICAL_SAMPLES: usize = 10;
pub const MILK_DROP_PERCENT: f64 = 20.0;
pub const MILK_DROP_CRITICAL_PERCENT: f64 = 40.0;

// Management
pub const DRY_OFF_WINDOW_DAYS: i64 = 60;
pub const DRY_OFF_CRITICAL_DAYS: i64 = 45;
pub const DRY_OFF_MILKING_LOOKBACK_DAYS: i64 = 7;

// Clinical
pub const CLINICAL_WINDOW_DAYS: i64 = 60;
pub const CLINICAL_TREATMENT_THRESHOLD: u64 = 3;
pub const CLINICAL_MIN_GAIN_KG: f64 = 5.0;

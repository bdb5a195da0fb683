use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const MIN_GRADE: u8 = 1;
pub const MAX_GRADE: u8 = 5;

/// A single vote. Immutable once accepted - there is no edit or removal.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Rating {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub grade: u8,
}

/// Grade 0 is rejected - the accepted range is 1 to 5 inclusive.
pub fn validate_grade(grade: i64) -> Result<u8> {
    if (MIN_GRADE as i64..=MAX_GRADE as i64).contains(&grade) {
        Ok(grade as u8)
    } else {
        Err(Error::RatingOutOfRange(grade))
    }
}

/// Appends a vote and returns the new average. A second vote from the same
/// user is rejected and leaves the list untouched.
pub fn record_vote(ratings: &mut Vec<Rating>, user_id: &str, grade: u8) -> Result<f64> {
    if ratings.iter().any(|r| r.user_id == user_id) {
        return Err(Error::RatingExists(user_id.to_string()));
    }
    ratings.push(Rating {
        user_id: user_id.to_string(),
        grade,
    });
    Ok(average(ratings))
}

/// Arithmetic mean of all grades, `0` for an unrated book.
pub fn average(ratings: &[Rating]) -> f64 {
    if ratings.is_empty() {
        return 0.0;
    }
    let total: u32 = ratings.iter().map(|r| r.grade as u32).sum();
    total as f64 / ratings.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vote_all(grades: &[(&str, u8)]) -> (Vec<Rating>, f64) {
        let mut ratings = Vec::new();
        let mut avg = 0.0;
        for (user, grade) in grades {
            avg = record_vote(&mut ratings, user, *grade).unwrap();
        }
        (ratings, avg)
    }

    #[test]
    fn test_average_order_independent() {
        let (_, avg1) = vote_all(&[("a", 1), ("b", 3), ("c", 5), ("d", 4)]);
        let (_, avg2) = vote_all(&[("d", 4), ("c", 5), ("a", 1), ("b", 3)]);
        assert_eq!(avg1, avg2);
        assert!((avg1 - 3.25).abs() < 1e-9);
    }

    #[test]
    fn test_empty_average_is_zero() {
        assert_eq!(average(&[]), 0.0);
    }

    #[test]
    fn test_duplicate_vote_rejected() {
        let (mut ratings, avg) = vote_all(&[("a", 2), ("b", 4)]);
        let res = record_vote(&mut ratings, "a", 5);
        assert!(matches!(res, Err(Error::RatingExists(_))));
        // list and average unchanged
        assert_eq!(ratings.len(), 2);
        assert_eq!(average(&ratings), avg);
    }

    #[test]
    fn test_grade_bounds() {
        assert!(validate_grade(0).is_err());
        assert!(validate_grade(6).is_err());
        assert!(validate_grade(-1).is_err());
        assert_eq!(validate_grade(1).unwrap(), 1);
        assert_eq!(validate_grade(5).unwrap(), 5);
    }
}

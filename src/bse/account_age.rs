// Step 1: account age factor.

pub fn score(account_age_days: i64) -> (f64, Vec<&'static str>) {
    if account_age_days < 1 {
        (-20.0, vec!["new_account"])
    } else if account_age_days < 7 {
        (-10.0, vec!["recent_account"])
    } else if account_age_days > 365 {
        (5.0, vec![])
    } else {
        (0.0, vec![])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brand_new_account_is_penalized() {
        assert_eq!(score(0), (-20.0, vec!["new_account"]));
    }

    #[test]
    fn test_recent_account_is_mildly_penalized() {
        assert_eq!(score(3), (-10.0, vec!["recent_account"]));
    }

    #[test]
    fn test_old_account_gets_bonus() {
        assert_eq!(score(400), (5.0, vec![]));
    }

    #[test]
    fn test_middle_aged_account_is_neutral() {
        assert_eq!(score(100), (0.0, vec![]));
    }
}

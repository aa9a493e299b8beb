// Step 2: bot-detection penalties, read from `metadata.bot_analysis` and
// `metadata.bot_detection_flags`.

use serde_json::Value;

pub fn score(metadata: &Value) -> (f64, Vec<&'static str>) {
    let mut delta = 0.0;
    let mut flags = Vec::new();

    let bot_analysis = metadata.get("bot_analysis");

    let bot_probability = bot_analysis
        .and_then(|b| b.get("fingerprint"))
        .and_then(|f| f.get("bot_probability"))
        .and_then(Value::as_f64)
        .unwrap_or(0.0);

    if bot_probability > 0.8 {
        delta -= 40.0;
        flags.push("high_bot_probability");
    } else if bot_probability > 0.6 {
        delta -= 25.0;
        flags.push("medium_bot_probability");
    } else if bot_probability > 0.4 {
        delta -= 10.0;
        flags.push("low_bot_probability");
    }

    if let Some(bot_flags) = metadata.get("bot_detection_flags").and_then(Value::as_array) {
        for flag in bot_flags.iter().filter_map(Value::as_str) {
            match flag {
                "browser_bot_flag" => {
                    delta -= 35.0;
                    flags.push("browser_detected_bot");
                }
                "datacenter_ip" => {
                    delta -= 20.0;
                    flags.push("datacenter_ip_usage");
                }
                "blacklisted_ip" => {
                    delta -= 30.0;
                    flags.push("blacklisted_ip_detected");
                }
                "low_confidence" => {
                    delta -= 10.0;
                    flags.push("bot_signal_low_confidence");
                }
                "incognito_mode" => {
                    delta -= 10.0;
                    flags.push("bot_signal_incognito_mode");
                }
                _ => {}
            }
        }
    }

    let iphub = bot_analysis.and_then(|b| b.get("iphub"));
    let is_blacklisted = iphub
        .and_then(|i| i.get("is_blacklisted"))
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if is_blacklisted {
        let block_type = iphub
            .and_then(|i| i.get("block_type"))
            .and_then(Value::as_i64)
            .unwrap_or(0);
        match block_type {
            1 => {
                delta -= 25.0;
                flags.push("commercial_vpn");
            }
            2 => {
                delta -= 30.0;
                flags.push("hosting_provider_ip");
            }
            _ => {}
        }
    }

    (delta, flags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_high_bot_probability_dominates_lower_bands() {
        let metadata = json!({"bot_analysis": {"fingerprint": {"bot_probability": 0.9}}});
        assert_eq!(score(&metadata), (-40.0, vec!["high_bot_probability"]));
    }

    #[test]
    fn test_explicit_flags_stack() {
        let metadata = json!({"bot_detection_flags": ["datacenter_ip", "blacklisted_ip"]});
        let (delta, flags) = score(&metadata);
        assert_eq!(delta, -50.0);
        assert_eq!(flags, vec!["datacenter_ip_usage", "blacklisted_ip_detected"]);
    }

    #[test]
    fn test_iphub_hosting_provider() {
        let metadata = json!({
            "bot_analysis": {"iphub": {"is_blacklisted": true, "block_type": 2}}
        });
        assert_eq!(score(&metadata), (-30.0, vec!["hosting_provider_ip"]));
    }

    #[test]
    fn test_no_signals_is_neutral() {
        assert_eq!(score(&json!({})), (0.0, vec![]));
    }
}

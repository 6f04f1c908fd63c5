//! Job naming: `gen_job_name` produces a name matching Kubernetes'
//! DNS-subdomain rules for object names.

use chrono::Local;
use rand::Rng;

/// Max length of a Kubernetes object name.
/// <https://kubernetes.io/docs/concepts/overview/working-with-objects/names/#names>
const JOB_NAME_MAX_LENGTH: usize = 63;

/// `<prefix>-<YYYYMMDDhhmmss>-<NNN>`, truncated to 63 characters,
/// underscores replaced by hyphens, lowercased.
pub fn gen_job_name(job_prefix: &str) -> String {
    let mut rng = rand::thread_rng();
    let random_suffix: u16 = rng.gen_range(0..=255);
    let timestamp = Local::now().format("%Y%m%d%H%M%S");
    let job_suffix = format!("{timestamp}-{random_suffix:03}");

    let max_prefix_len = JOB_NAME_MAX_LENGTH.saturating_sub(1 + job_suffix.len());
    let truncated_prefix: String = job_prefix.chars().take(max_prefix_len).collect();

    let mut job_name = format!("{truncated_prefix}-{job_suffix}");
    job_name = job_name.replace('_', "-").to_lowercase();
    job_name.truncate(JOB_NAME_MAX_LENGTH);
    job_name
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn generated_name_matches_dns_subdomain_rules() {
        let name = gen_job_name("my_prefix");
        assert!(name.len() <= 63);
        let re = Regex::new(r"^[a-z0-9-]{1,63}$").unwrap();
        assert!(re.is_match(&name), "name {name} did not match DNS subdomain rules");
        assert!(!name.contains('_'));
        assert!(name.starts_with("my-prefix-"));
    }

    #[test]
    fn long_underscored_prefix_is_truncated_and_sanitized() {
        let prefix = "long_UNDERSCORED_prefix_that_keeps_going_and_going_and_going_and_going";
        let name = gen_job_name(prefix);
        assert!(name.len() <= 63);
        assert!(!name.contains('_'));
        assert_eq!(name, name.to_lowercase());

        // Timestamp (14 digits) + "-" + 3 digit random suffix must be present.
        let re = Regex::new(r"-\d{14}-\d{3}$").unwrap();
        assert!(re.is_match(&name), "name {name} missing timestamp/random suffix");
    }

    #[test]
    fn short_prefix_is_kept_verbatim() {
        let name = gen_job_name("p");
        assert!(name.starts_with("p-"));
    }
}

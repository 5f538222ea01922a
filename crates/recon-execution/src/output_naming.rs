use chrono::{DateTime, Utc};
use recon_template::sanitize_filename;
use recon_types::ScanOutputMode;

/// Synthesise the default output filename (and, in `both` mode, a second
/// `_latest`-suffixed name). An explicit `output_filename` from the
/// tool config is used verbatim and bypasses synthesis entirely.
pub fn resolve_output_names(
    explicit: Option<&str>,
    tool: &str,
    target: &str,
    workflow: Option<&str>,
    step: Option<&str>,
    timestamp: DateTime<Utc>,
    mode: ScanOutputMode,
) -> (String, Option<String>) {
    if let Some(name) = explicit {
        return (name.to_string(), None);
    }

    let base = compose_base(tool, target, workflow, step);
    let stamp = timestamp.format("%Y%m%dT%H%M%SZ").to_string();

    match mode {
        ScanOutputMode::Overwrite => (sanitize_filename(&base), None),
        ScanOutputMode::Timestamp => {
            (sanitize_filename(&format!("{base}_{stamp}")), None)
        }
        ScanOutputMode::Both => (
            sanitize_filename(&format!("{base}_{stamp}")),
            Some(sanitize_filename(&format!("{base}_latest"))),
        ),
    }
}

fn compose_base(tool: &str, target: &str, workflow: Option<&str>, step: Option<&str>) -> String {
    let mut base = format!("{tool}_{}", sanitize_filename(target));
    if let Some(workflow) = workflow {
        base.push('_');
        base.push_str(workflow);
    }
    if let Some(step) = step {
        base.push('_');
        base.push_str(step);
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts() -> DateTime<Utc> {
        "2026-07-28T12:00:00Z".parse().unwrap()
    }

    #[test]
    fn explicit_name_bypasses_synthesis() {
        let (name, latest) =
            resolve_output_names(Some("fixed.json"), "naabu", "t", None, None, ts(), ScanOutputMode::Both);
        assert_eq!(name, "fixed.json");
        assert!(latest.is_none());
    }

    #[test]
    fn overwrite_mode_has_no_timestamp() {
        let (name, latest) = resolve_output_names(
            None,
            "naabu",
            "scanme.example.com",
            Some("recon"),
            Some("p"),
            ts(),
            ScanOutputMode::Overwrite,
        );
        assert_eq!(name, "naabu_scanme_example_com_recon_p");
        assert!(latest.is_none());
    }

    #[test]
    fn both_mode_produces_timestamped_and_latest_names() {
        let (name, latest) =
            resolve_output_names(None, "naabu", "t", None, None, ts(), ScanOutputMode::Both);
        assert!(name.contains("20260728"));
        assert_eq!(latest.unwrap(), "naabu_t_latest");
    }
}

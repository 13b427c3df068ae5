use anyhow::Result;
use tracing::{info, warn};

use crate::args::Config;
use crate::az::{to_megabytes, AzCli, Manifest, Runner};
use crate::prompt::Confirm;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub removed: usize,
    /// Only present if something was removed and the usage was fetched again.
    pub reclaimed_bytes: Option<i64>,
}

/// Splits manifests into `(untagged, tagged)`, both in fetch order.
pub fn partition_untagged(manifests: Vec<Manifest>) -> (Vec<Manifest>, Vec<Manifest>) {
    manifests.into_iter().partition(Manifest::is_untagged)
}

/// Removes the untagged manifests of a single repository after confirmation.
/// Returns the number of deleted manifests.
pub fn process_repository<R: Runner, C: Confirm>(
    az: &mut AzCli<R>,
    confirm: &mut C,
    repository: &str,
    dry_run: bool,
) -> Result<usize> {
    info!("Now checking repository '{repository}' for untagged images...");

    let manifests = az.show_manifests(repository)?;
    let total = manifests.len();
    let (untagged, _) = partition_untagged(manifests);

    if untagged.is_empty() {
        warn!("Found no untagged images in this repository.");
        return Ok(0);
    }

    if dry_run {
        info!(
            "Dry run is enabled. If it were not, the following {} of {total} images would be deleted:",
            untagged.len()
        );
        for manifest in &untagged {
            info!("- {repository}@{}", manifest.digest);
        }
        return Ok(0);
    }

    let question = format!(
        "Found {} untagged images out of {total} images in total. Do you want to continue?",
        untagged.len()
    );
    if !confirm.confirm(&question, true)? {
        return Ok(0);
    }

    for manifest in &untagged {
        info!("{repository}@{}", manifest.digest);
        az.delete_image(repository, &manifest.digest)?;
    }

    Ok(untagged.len())
}

pub fn run<R: Runner, C: Confirm>(
    config: &Config,
    az: &mut AzCli<R>,
    confirm: &mut C,
    dry_run: bool,
) -> Result<RunSummary> {
    let usage = az.show_usage()?;
    info!("Current ACR usage: {usage}.");

    let mut removed = 0;
    for repository in &config.repositories {
        removed += process_repository(az, confirm, repository, dry_run)?;
    }

    if removed == 0 {
        warn!("Nothing to do, exiting now...");
        return Ok(RunSummary {
            removed,
            reclaimed_bytes: None,
        });
    }

    let new_usage = az.show_usage()?;
    let reclaimed = usage.current_value - new_usage.current_value;
    info!("ACR usage after cleanup: {new_usage}.");
    info!(
        "You reclaimed {:.3} MB of your allowed storage space.",
        to_megabytes(reclaimed)
    );

    Ok(RunSummary {
        removed,
        reclaimed_bytes: Some(reclaimed),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::az::fake::FakeRunner;
    use crate::prompt::fake::ScriptedConfirm;

    const THREE_MANIFESTS: &str = r#"[
        {"digest": "sha256:aaa", "tags": ["latest"]},
        {"digest": "sha256:bbb", "tags": []},
        {"digest": "sha256:ccc"}
    ]"#;

    fn config(repositories: &str) -> Config {
        Config::new("rg", "myacr", repositories).unwrap()
    }

    #[test]
    fn partition_keeps_tagged_out() {
        let manifests: Vec<Manifest> = serde_json::from_str(THREE_MANIFESTS).unwrap();
        let (untagged, tagged) = partition_untagged(manifests);
        let untagged = untagged.iter().map(|x| x.digest.as_str()).collect::<Vec<_>>();
        assert_eq!(untagged, vec!["sha256:bbb", "sha256:ccc"]);
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].digest, "sha256:aaa");
    }

    #[test]
    fn no_untagged_images_skips_prompt() {
        let runner = FakeRunner::default()
            .with_manifests("api", r#"[{"digest": "sha256:aaa", "tags": ["v1"]}]"#);
        let mut az = AzCli::new(runner, "rg", "myacr");
        let mut confirm = ScriptedConfirm::default();

        let removed = process_repository(&mut az, &mut confirm, "api", false).unwrap();
        assert_eq!(removed, 0);
        assert!(confirm.questions.is_empty());
        assert!(az.runner().deleted_images().is_empty());
    }

    #[test]
    fn declined_prompt_deletes_nothing() {
        let runner = FakeRunner::default().with_manifests("api", THREE_MANIFESTS);
        let mut az = AzCli::new(runner, "rg", "myacr");
        let mut confirm = ScriptedConfirm::answering(&[false]);

        let removed = process_repository(&mut az, &mut confirm, "api", false).unwrap();
        assert_eq!(removed, 0);
        assert_eq!(
            confirm.questions,
            vec!["Found 2 untagged images out of 3 images in total. Do you want to continue?"]
        );
        assert!(az.runner().deleted_images().is_empty());
    }

    #[test]
    fn confirmed_prompt_deletes_each_untagged_image() {
        let runner = FakeRunner::default().with_manifests("api", THREE_MANIFESTS);
        let mut az = AzCli::new(runner, "rg", "myacr");
        let mut confirm = ScriptedConfirm::answering(&[true]);

        let removed = process_repository(&mut az, &mut confirm, "api", false).unwrap();
        assert_eq!(removed, 2);
        assert_eq!(
            az.runner().deleted_images(),
            vec!["api@sha256:bbb", "api@sha256:ccc"]
        );
    }

    #[test]
    fn dry_run_deletes_nothing() {
        let runner = FakeRunner::default().with_manifests("api", THREE_MANIFESTS);
        let mut az = AzCli::new(runner, "rg", "myacr");
        let mut confirm = ScriptedConfirm::default();

        let removed = process_repository(&mut az, &mut confirm, "api", true).unwrap();
        assert_eq!(removed, 0);
        assert!(confirm.questions.is_empty());
        assert!(az.runner().deleted_images().is_empty());
    }

    #[test]
    fn failed_delete_aborts_the_repository() {
        let runner = FakeRunner {
            fail_deletes: true,
            ..Default::default()
        }
        .with_manifests("api", THREE_MANIFESTS);
        let mut az = AzCli::new(runner, "rg", "myacr");
        let mut confirm = ScriptedConfirm::answering(&[true]);

        assert!(process_repository(&mut az, &mut confirm, "api", false).is_err());
        assert_eq!(az.runner().deleted_images(), vec!["api@sha256:bbb"]);
    }

    #[test]
    fn run_reports_reclaimed_space() {
        let runner = FakeRunner::default()
            .with_usage(2147483648, 10737418240)
            .with_usage(1073741824, 10737418240)
            .with_manifests("api", THREE_MANIFESTS);
        let mut az = AzCli::new(runner, "rg", "myacr");
        let mut confirm = ScriptedConfirm::answering(&[true]);

        let summary = run(&config("api"), &mut az, &mut confirm, false).unwrap();
        assert_eq!(summary.removed, 2);
        assert_eq!(summary.reclaimed_bytes, Some(1073741824));
        assert_eq!(format!("{:.3}", to_megabytes(1073741824)), "1024.000");
        assert_eq!(az.runner().calls_to("show-usage").len(), 2);
        assert_eq!(az.runner().deleted_images().len(), 2);
    }

    #[test]
    fn run_without_removals_skips_second_usage_fetch() {
        let runner = FakeRunner::default()
            .with_usage(2147483648, 10737418240)
            .with_manifests("api", r#"[{"digest": "sha256:aaa", "tags": ["v1"]}]"#)
            .with_manifests("web", r#"[{"digest": "sha256:bbb", "tags": []}]"#);
        let mut az = AzCli::new(runner, "rg", "myacr");
        let mut confirm = ScriptedConfirm::answering(&[false]);

        let summary = run(&config("api,web"), &mut az, &mut confirm, false).unwrap();
        assert_eq!(
            summary,
            RunSummary {
                removed: 0,
                reclaimed_bytes: None
            }
        );
        assert_eq!(confirm.questions.len(), 1);
        assert_eq!(az.runner().calls_to("show-usage").len(), 1);
        assert!(az.runner().deleted_images().is_empty());
    }

    #[test]
    fn failing_repository_stops_the_run() {
        let runner = FakeRunner::default()
            .with_usage(2147483648, 10737418240)
            .with_manifests("web", THREE_MANIFESTS);
        let mut az = AzCli::new(runner, "rg", "myacr");
        let mut confirm = ScriptedConfirm::default();

        let err = run(&config("api,web"), &mut az, &mut confirm, false).unwrap_err();
        assert_eq!(
            err.to_string(),
            "The call to get the manifests from the ACR failed."
        );
        assert_eq!(az.runner().calls_to("show-manifests").len(), 1);
    }
}

use std::{error::Error, path::Path, sync::Arc};

use log::info;

use crate::{
    build::{self, BuildStatus, LibraryBuilder},
    fetch::{self, FetchSettings, FetchSummary, RepositoryFetcher, VendorDir},
    model::{GrammarLayout, Manifest},
};

/// Handler to fetch command
pub fn do_fetch<F: RepositoryFetcher>(
    fetcher: Arc<F>,
    manifest: &Manifest,
    vendor_dir: &Path,
    settings: &FetchSettings,
) -> Result<FetchSummary, Box<dyn Error>> {
    let vendor = VendorDir::open(vendor_dir.to_path_buf())?;
    let summary = fetch::fetch_all(fetcher, manifest, &vendor, settings)?;
    Ok(summary)
}

/// Handler to build command
/// 1 - Fetches every manifest entry into the vendor directory
/// 2 - Resolves the grammar directories in manifest order
/// 3 - Hands them to the library builder in a single call
pub fn do_build<F: RepositoryFetcher, B: LibraryBuilder>(
    fetcher: Arc<F>,
    builder: &B,
    manifest: &Manifest,
    layout: &GrammarLayout,
    vendor_dir: &Path,
    output: &Path,
    settings: &FetchSettings,
) -> Result<BuildStatus, Box<dyn Error>> {
    // The lock stays held until the build has read the sources.
    let vendor = VendorDir::open(vendor_dir.to_path_buf())?;
    fetch::fetch_all(fetcher, manifest, &vendor, settings)?;

    let sources = layout.source_directories(manifest, vendor.location())?;
    info!("Building {}", output.display());
    let status = builder.build(&sources, output)?;

    Ok(status)
}

/// Handler to clean command
pub fn do_clean(vendor_dir: &Path, output: &Path) -> Result<(), Box<dyn Error>> {
    info!(
        "Cleaning vendored grammars {} and library {}.",
        vendor_dir.display(),
        output.display()
    );
    if vendor_dir.is_dir() {
        // Waits for a running fetch or build to finish with the checkouts.
        let vendor = VendorDir::open(vendor_dir.to_path_buf())?;
        vendor.clear()?;
    }
    let result1 = std::fs::remove_dir_all(vendor_dir);
    let result2 = std::fs::remove_file(output);
    let result3 = std::fs::remove_file(build::sources_stamp(output));

    for (result, path) in [(result1, vendor_dir), (result2, output)] {
        match result {
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!("{} is already removed, nothing to do", path.display());
                Ok(())
            }
            otherwise => otherwise,
        }?;
    }
    match result3 {
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        otherwise => otherwise,
    }?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::{path::PathBuf, time::Duration};

    use pretty_assertions::assert_eq;

    use crate::{
        fetch::FetchError,
        testing::{FakeFetcher, RecordingBuilder, MARKER},
    };

    #[test]
    fn fetches_then_builds_in_manifest_order() {
        let dir = tempfile::tempdir().unwrap();
        let vendor_dir = dir.path().join("vendor");
        let output = dir.path().join("tree_sitter_languages/languages.so");
        let manifest =
            Manifest::from_str("https://host/a 1111111\nhttps://host/b/ 2222222\n").unwrap();
        let builder = RecordingBuilder::default();

        do_build(
            Arc::new(FakeFetcher::default()),
            &builder,
            &manifest,
            &GrammarLayout::default(),
            &vendor_dir,
            &output,
            &FetchSettings::default(),
        )
        .unwrap();

        assert_eq!(
            std::fs::read_to_string(vendor_dir.join("a").join(MARKER)).unwrap(),
            "1111111"
        );
        assert_eq!(
            std::fs::read_to_string(vendor_dir.join("b").join(MARKER)).unwrap(),
            "2222222"
        );
        assert_eq!(
            builder.calls(),
            vec![(vec![vendor_dir.join("a"), vendor_dir.join("b")], output)]
        );
    }

    #[test]
    fn completion_order_does_not_reorder_build_input() {
        let dir = tempfile::tempdir().unwrap();
        let vendor_dir = dir.path().join("vendor");
        let manifest = Manifest::from_str(
            "https://host/first 1111111\n\
             https://host/second 2222222\n\
             https://host/third 3333333\n",
        )
        .unwrap();
        let fetcher = Arc::new(
            FakeFetcher::default()
                .delay("first", Duration::from_millis(300))
                .delay("second", Duration::from_millis(150)),
        );
        let builder = RecordingBuilder::default();

        do_build(
            fetcher.clone(),
            &builder,
            &manifest,
            &GrammarLayout::default(),
            &vendor_dir,
            &dir.path().join("languages.so"),
            &FetchSettings::default(),
        )
        .unwrap();

        assert_eq!(fetcher.completion_order(), vec!["third", "second", "first"]);
        let (sources, _) = builder.calls().remove(0);
        assert_eq!(
            sources,
            vec![
                vendor_dir.join("first"),
                vendor_dir.join("second"),
                vendor_dir.join("third"),
            ]
        );
    }

    #[test]
    fn failed_fetch_never_builds() {
        let dir = tempfile::tempdir().unwrap();
        let manifest =
            Manifest::from_str("https://host/a 1111111\nhttps://host/b/ deadbeef\n").unwrap();
        let builder = RecordingBuilder::default();

        let error = do_build(
            Arc::new(FakeFetcher::failing(&["b"])),
            &builder,
            &manifest,
            &GrammarLayout::default(),
            &dir.path().join("vendor"),
            &dir.path().join("languages.so"),
            &FetchSettings::default(),
        )
        .unwrap_err();

        assert!(matches!(
            error.downcast_ref::<FetchError>(),
            Some(FetchError::Failed { .. })
        ));
        assert!(builder.calls().is_empty());
    }

    #[test]
    fn build_uses_layout_paths() {
        let dir = tempfile::tempdir().unwrap();
        let vendor_dir = dir.path().join("vendor");
        let manifest = Manifest::from_str(
            "https://host/tree-sitter-typescript 1111111\nhttps://host/tree-sitter-swift 2222222\n",
        )
        .unwrap();
        let layout = GrammarLayout::from_str(
            r#"
            [grammar.tree-sitter-typescript]
            paths = ["tsx", "typescript"]

            [grammar.tree-sitter-swift]
            skip = true
            "#,
        )
        .unwrap();
        let builder = RecordingBuilder::default();

        do_build(
            Arc::new(FakeFetcher::default()),
            &builder,
            &manifest,
            &layout,
            &vendor_dir,
            &dir.path().join("languages.so"),
            &FetchSettings::default(),
        )
        .unwrap();

        let (sources, _) = builder.calls().remove(0);
        let typescript = vendor_dir.join("tree-sitter-typescript");
        assert_eq!(
            sources,
            vec![typescript.join("tsx"), typescript.join("typescript")]
        );
    }

    #[test]
    fn clean_removes_vendor_and_library() {
        let dir = tempfile::tempdir().unwrap();
        let vendor_dir = dir.path().join("vendor");
        std::fs::create_dir_all(vendor_dir.join("a")).unwrap();
        let output = dir.path().join("languages.so");
        std::fs::write(&output, "").unwrap();
        std::fs::write(build::sources_stamp(&output), "").unwrap();

        do_clean(&vendor_dir, &output).unwrap();
        assert!(!vendor_dir.exists());
        assert!(!output.exists());
        assert!(!build::sources_stamp(&output).exists());

        // Nothing left to remove is not an error.
        do_clean(&vendor_dir, &output).unwrap();
    }

    #[test]
    fn clean_waits_for_vendor_lock() {
        let dir = tempfile::tempdir().unwrap();
        let vendor_dir = dir.path().join("vendor");
        let vendor = VendorDir::open(vendor_dir.clone()).unwrap();
        std::fs::create_dir(vendor_dir.join("a")).unwrap();

        let clean = {
            let vendor_dir = vendor_dir.clone();
            let output = dir.path().join("languages.so");
            std::thread::spawn(move || do_clean(&vendor_dir, &output).map_err(|e| e.to_string()))
        };
        std::thread::sleep(Duration::from_millis(300));
        assert!(vendor_dir.join("a").exists());

        drop(vendor);
        clean.join().unwrap().unwrap();
        assert!(!vendor_dir.exists());
    }

    #[test]
    fn fetch_only_reports_summary() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = Manifest::from_str("https://host/a 1111111\n").unwrap();
        let vendor_dir: PathBuf = dir.path().join("vendor");

        let summary = do_fetch(
            Arc::new(FakeFetcher::default()),
            &manifest,
            &vendor_dir,
            &FetchSettings::default(),
        )
        .unwrap();

        assert_eq!(summary.fetched, 1);
        assert!(vendor_dir.join("a").join(MARKER).exists());
    }
}

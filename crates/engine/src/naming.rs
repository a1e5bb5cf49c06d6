use std::path::Path;

use core_types::{ExportSpec, NamingPolicy};

/// Output file name for an export. The extension always follows the export
/// format, never the original file.
///
/// Names are not checked for collisions; two inputs mapping to the same name
/// overwrite each other.
pub fn build_name(
    original_stem: &str,
    policy: NamingPolicy,
    prefix: &str,
    suffix: &str,
    target_ext: &str,
) -> String {
    match policy {
        NamingPolicy::Original => format!("{original_stem}.{target_ext}"),
        NamingPolicy::Prefix => format!("{prefix}{original_stem}.{target_ext}"),
        NamingPolicy::Suffix => format!("{original_stem}{suffix}.{target_ext}"),
    }
}

/// File name without its last extension; `image` when there is none.
pub fn output_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| "image".to_string())
}

pub fn output_name(input: &Path, spec: &ExportSpec) -> String {
    build_name(
        &output_stem(input),
        spec.naming,
        &spec.prefix,
        &spec.suffix,
        spec.format.extension(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::ExportFormat;

    #[test]
    fn naming_policies() {
        assert_eq!(
            build_name("photo", NamingPolicy::Prefix, "wm_", "_out", "jpeg"),
            "wm_photo.jpeg"
        );
        assert_eq!(
            build_name("photo", NamingPolicy::Suffix, "wm_", "_out", "png"),
            "photo_out.png"
        );
        assert_eq!(build_name("photo", NamingPolicy::Original, "", "", "png"), "photo.png");
    }

    #[test]
    fn extension_is_retargeted_to_export_format() {
        let spec = ExportSpec {
            format: ExportFormat::Jpeg,
            naming: NamingPolicy::Suffix,
            suffix: "_wm".into(),
            ..ExportSpec::default()
        };
        assert_eq!(output_name(Path::new("/tmp/IMG_0001.PNG"), &spec), "IMG_0001_wm.jpeg");
    }

    #[test]
    fn stem_keeps_inner_dots() {
        assert_eq!(output_stem(Path::new("a/holiday.2024.jpg")), "holiday.2024");
        assert_eq!(output_stem(Path::new("noext")), "noext");
        assert_eq!(output_stem(Path::new("/")), "image");
    }
}

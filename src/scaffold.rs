//! Scaffolding for new pages and components.
//!
//! `create -p login` copies every file from `template/pages/` into
//! `src/pages/login/`, renaming each file's stem to the new name, so a
//! template of `page.wxml`, `page.scss`, `page.ts` and `page.json`
//! becomes a ready-to-register page. Components work the same way under
//! `components/`, and `-s` selects a variant subdirectory of the
//! template.

use std::fs;

use camino::Utf8PathBuf;

use crate::config::Project;
use crate::error::ScaffoldError;

/// What kind of unit to scaffold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Page,
    Component,
}

impl Kind {
    /// Directory name used both under `template/` and under `src/`.
    pub fn dir(self) -> &'static str {
        match self {
            Kind::Page => "pages",
            Kind::Component => "components",
        }
    }
}

/// Copies the template files for `kind` into `src/<dir>/<name>/`,
/// renaming every file stem to `name`. Returns the created files. The
/// source tree is only touched once the template directory is known to
/// exist.
pub fn create(
    project: &Project,
    kind: Kind,
    name: &str,
    variant: &str,
) -> Result<Vec<Utf8PathBuf>, ScaffoldError> {
    let mut template = project.template.join(kind.dir());
    if !variant.is_empty() {
        template.push(variant);
    }

    if !template.is_dir() {
        return Err(ScaffoldError::TemplateMissing(template));
    }

    let target = project.src.join(kind.dir()).join(name);
    fs::create_dir_all(&target)?;

    let mut entries: Vec<_> = template.read_dir_utf8()?.collect::<Result<_, _>>()?;
    entries.sort_by_key(|entry| entry.path().to_path_buf());

    let mut created = Vec::new();

    for entry in entries {
        if !entry.file_type()?.is_file() {
            continue;
        }

        let source = entry.path();
        let mut dest = target.join(name);
        if let Some(ext) = source.extension() {
            dest.set_extension(ext);
        }

        fs::copy(source, &dest)?;
        tracing::info!("Created {dest}");
        created.push(dest);
    }

    Ok(created)
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;

    use crate::config::Mode;

    use super::*;

    fn project_with_templates() -> (tempfile::TempDir, Project) {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let project = Project::new(root, Mode::Development);

        let pages = project.template.join("pages");
        fs::create_dir_all(&pages).unwrap();
        for ext in ["wxml", "scss", "ts", "json"] {
            fs::write(pages.join(format!("page.{ext}")), format!("page {ext}")).unwrap();
        }

        let minimal = pages.join("minimal");
        fs::create_dir_all(&minimal).unwrap();
        fs::write(minimal.join("page.wxml"), "minimal").unwrap();

        (dir, project)
    }

    #[test]
    fn scaffolds_a_page_under_its_own_name() {
        let (_dir, project) = project_with_templates();

        let created = create(&project, Kind::Page, "login", "").unwrap();

        let base = project.src.join("pages/login");
        assert_eq!(
            created,
            vec![
                base.join("login.json"),
                base.join("login.scss"),
                base.join("login.ts"),
                base.join("login.wxml"),
            ],
        );
        assert_eq!(fs::read_to_string(base.join("login.wxml")).unwrap(), "page wxml");
    }

    #[test]
    fn variant_selects_a_template_subdirectory() {
        let (_dir, project) = project_with_templates();

        let created = create(&project, Kind::Page, "about", "minimal").unwrap();

        assert_eq!(created, vec![project.src.join("pages/about/about.wxml")]);
        assert_eq!(
            fs::read_to_string(project.src.join("pages/about/about.wxml")).unwrap(),
            "minimal",
        );
    }

    #[test]
    fn components_live_under_their_own_tree() {
        let (_dir, project) = project_with_templates();

        let components = project.template.join("components");
        fs::create_dir_all(&components).unwrap();
        fs::write(components.join("comp.wxml"), "comp").unwrap();

        let created = create(&project, Kind::Component, "badge", "").unwrap();

        assert_eq!(created, vec![project.src.join("components/badge/badge.wxml")]);
    }

    #[test]
    fn missing_template_directory_is_an_error() {
        let (_dir, project) = project_with_templates();

        let result = create(&project, Kind::Page, "oops", "no-such-variant");

        assert!(matches!(result, Err(ScaffoldError::TemplateMissing(_))));
        // Nothing was created under src/.
        assert!(!project.src.join("pages/oops").exists());
    }
}

//! Repository analysis phase.
//!
//! Walks the target repository and derives its technology profile: languages
//! by extension, build tools and package managers by manifest, top-level
//! dependency names, container and Kubernetes artifacts, CI configuration,
//! infrastructure-as-code, and a rough complexity/confidence score. The
//! origin URL is read from the repository itself when the run config did not
//! supply one.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use walkdir::WalkDir;

use crate::phases::PhaseHandler;
use crate::state::{RepositoryAnalysis, StateUpdate, WorkflowPhase, WorkflowState};

/// Directories never worth descending into.
const SKIP_DIRS: &[&str] = &[".git", "target", "node_modules", "dist", "build", ".venv", "vendor"];

/// Extension -> language.
const LANGUAGES: &[(&str, &str)] = &[
    ("rs", "rust"),
    ("py", "python"),
    ("js", "javascript"),
    ("jsx", "javascript"),
    ("ts", "typescript"),
    ("tsx", "typescript"),
    ("go", "go"),
    ("java", "java"),
    ("kt", "kotlin"),
    ("rb", "ruby"),
    ("php", "php"),
    ("cs", "csharp"),
    ("c", "c"),
    ("cc", "cpp"),
    ("cpp", "cpp"),
    ("swift", "swift"),
    ("sh", "shell"),
];

/// CI configuration files and the system they belong to.
const CI_FILES: &[(&str, &str)] = &[
    (".gitlab-ci.yml", "gitlab-ci"),
    ("Jenkinsfile", "jenkins"),
    (".travis.yml", "travis"),
    ("azure-pipelines.yml", "azure-pipelines"),
    ("bitbucket-pipelines.yml", "bitbucket-pipelines"),
];

/// Dependency names a language ecosystem treats as a framework.
const FRAMEWORKS: &[&str] = &[
    "django", "flask", "fastapi", "rails", "spring-boot", "express", "react", "next", "vue",
    "axum", "actix-web", "rocket", "gin", "echo",
];

#[derive(Debug, Default)]
struct RepoScan {
    files_scanned: usize,
    language_counts: BTreeMap<String, usize>,
    build_tools: BTreeSet<String>,
    package_managers: BTreeSet<String>,
    dependencies: BTreeMap<String, Vec<String>>,
    entry_points: BTreeSet<String>,
    test_frameworks: BTreeSet<String>,
    dockerfile_present: bool,
    docker_compose_present: bool,
    kubernetes_manifests: BTreeSet<String>,
    ci_files_present: BTreeSet<String>,
    infrastructure_as_code: BTreeSet<String>,
    parse_warnings: Vec<String>,
}

/// Analyzes the target repository into a `RepositoryAnalysis` record.
pub struct RepoAnalyzer;

impl RepoAnalyzer {
    fn scan(root: &Path) -> RepoScan {
        let mut scan = RepoScan::default();

        let walker = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                let name = entry.file_name().to_string_lossy();
                !(entry.file_type().is_dir() && SKIP_DIRS.contains(&name.as_ref()))
            });

        for entry in walker.filter_map(Result::ok) {
            if !entry.file_type().is_file() {
                continue;
            }
            scan.files_scanned += 1;

            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            let rel = path.strip_prefix(root).unwrap_or(path);

            if let Some(ext) = path.extension().and_then(|e| e.to_str())
                && let Some((_, language)) = LANGUAGES.iter().find(|(e, _)| *e == ext)
            {
                *scan
                    .language_counts
                    .entry((*language).to_string())
                    .or_default() += 1;
            }

            Self::inspect_file(&mut scan, path, rel, &name);
        }

        scan
    }

    fn inspect_file(scan: &mut RepoScan, path: &Path, rel: &Path, name: &str) {
        let rel_display = rel.display().to_string();
        let rel_lower = rel_display.to_lowercase();

        match name {
            "Cargo.toml" => {
                scan.build_tools.insert("cargo".to_string());
                scan.package_managers.insert("cargo".to_string());
                match Self::cargo_dependencies(path) {
                    Ok(deps) => {
                        scan.dependencies.insert(rel_display.clone(), deps);
                    }
                    Err(e) => scan.parse_warnings.push(format!("{rel_display}: {e}")),
                }
            }
            "package.json" => {
                scan.build_tools.insert("npm".to_string());
                scan.package_managers.insert("npm".to_string());
                match Self::npm_dependencies(path) {
                    Ok((deps, test_fws)) => {
                        scan.dependencies.insert(rel_display.clone(), deps);
                        scan.test_frameworks.extend(test_fws);
                    }
                    Err(e) => scan.parse_warnings.push(format!("{rel_display}: {e}")),
                }
            }
            "pyproject.toml" => {
                scan.build_tools.insert("python-build".to_string());
                scan.package_managers.insert("pip".to_string());
            }
            "requirements.txt" => {
                scan.package_managers.insert("pip".to_string());
            }
            "go.mod" => {
                scan.build_tools.insert("go".to_string());
                scan.package_managers.insert("go-modules".to_string());
            }
            "pom.xml" => {
                scan.build_tools.insert("maven".to_string());
                scan.package_managers.insert("maven".to_string());
            }
            "build.gradle" | "build.gradle.kts" => {
                scan.build_tools.insert("gradle".to_string());
                scan.package_managers.insert("gradle".to_string());
            }
            "Makefile" => {
                scan.build_tools.insert("make".to_string());
            }
            "Dockerfile" => scan.dockerfile_present = true,
            "docker-compose.yml" | "docker-compose.yaml" | "compose.yml" | "compose.yaml" => {
                scan.docker_compose_present = true;
            }
            "Chart.yaml" => {
                scan.infrastructure_as_code.insert("helm".to_string());
            }
            "pytest.ini" | "tox.ini" => {
                scan.test_frameworks.insert("pytest".to_string());
            }
            _ => {}
        }

        match name {
            "main.rs" | "main.py" | "main.go" | "index.js" | "index.ts" | "manage.py" => {
                scan.entry_points.insert(rel_display.clone());
            }
            _ => {}
        }

        if let Some((_, system)) = CI_FILES.iter().find(|(file, _)| *file == name) {
            scan.ci_files_present.insert((*system).to_string());
        }
        if rel_lower.starts_with(".github/workflows/") {
            scan.ci_files_present.insert("github-actions".to_string());
        }
        if rel_lower.ends_with(".tf") {
            scan.infrastructure_as_code.insert("terraform".to_string());
        }

        let is_yaml = rel_lower.ends_with(".yml") || rel_lower.ends_with(".yaml");
        if is_yaml
            && ["k8s", "kube", "manifests", "deploy"]
                .iter()
                .any(|dir| rel_lower.split('/').any(|part| part.contains(dir)))
        {
            scan.kubernetes_manifests.insert(rel_display);
        }
    }

    fn cargo_dependencies(path: &Path) -> anyhow::Result<Vec<String>> {
        let content = std::fs::read_to_string(path)?;
        let manifest: toml::Value = toml::from_str(&content)?;
        let deps = manifest
            .get("dependencies")
            .and_then(|d| d.as_table())
            .map(|table| table.keys().cloned().collect())
            .unwrap_or_default();
        Ok(deps)
    }

    fn npm_dependencies(path: &Path) -> anyhow::Result<(Vec<String>, Vec<String>)> {
        let content = std::fs::read_to_string(path)?;
        let manifest: serde_json::Value = serde_json::from_str(&content)?;

        let deps: Vec<String> = manifest
            .get("dependencies")
            .and_then(|d| d.as_object())
            .map(|obj| obj.keys().cloned().collect())
            .unwrap_or_default();

        let test_frameworks = manifest
            .get("devDependencies")
            .and_then(|d| d.as_object())
            .map(|obj| {
                ["jest", "mocha", "vitest"]
                    .iter()
                    .filter(|fw| obj.contains_key(**fw))
                    .map(|fw| fw.to_string())
                    .collect()
            })
            .unwrap_or_default();

        Ok((deps, test_frameworks))
    }

    fn discover_repo_url(path: &Path) -> Option<String> {
        let repo = git2::Repository::discover(path).ok()?;
        let remote = repo.find_remote("origin").ok()?;
        remote.url().map(str::to_string)
    }

    fn frameworks(dependencies: &BTreeMap<String, Vec<String>>) -> Vec<String> {
        let mut found = BTreeSet::new();
        for deps in dependencies.values() {
            for dep in deps {
                if FRAMEWORKS.contains(&dep.as_str()) {
                    found.insert(dep.clone());
                }
            }
        }
        found.into_iter().collect()
    }

    fn complexity_score(scan: &RepoScan) -> u8 {
        let mut score: u8 = match scan.files_scanned {
            0..=50 => 1,
            51..=500 => 2,
            _ => 3,
        };
        if scan.language_counts.len() > 1 {
            score += 1;
        }
        if scan.language_counts.len() > 3 {
            score += 1;
        }
        if scan.dockerfile_present {
            score += 1;
        }
        if scan.docker_compose_present {
            score += 1;
        }
        if !scan.kubernetes_manifests.is_empty() {
            score += 2;
        }
        if !scan.infrastructure_as_code.is_empty() {
            score += 1;
        }
        score.clamp(1, 10)
    }

    fn confidence(scan: &RepoScan, primary_language: &str) -> f64 {
        let mut confidence: f64 = 0.5;
        if primary_language != "unknown" {
            confidence += 0.2;
        }
        if !scan.build_tools.is_empty() {
            confidence += 0.15;
        }
        if !scan.ci_files_present.is_empty() {
            confidence += 0.1;
        }
        confidence.min(0.95)
    }
}

#[async_trait]
impl PhaseHandler for RepoAnalyzer {
    fn phase(&self) -> WorkflowPhase {
        WorkflowPhase::Analyze
    }

    async fn run(&self, state: &WorkflowState) -> anyhow::Result<StateUpdate> {
        let repo_path = &state.repo_path;
        if !repo_path.is_dir() {
            return Ok(StateUpdate::new()
                .with_phase(WorkflowPhase::Error)
                .with_error(format!(
                    "Repository analysis failed: not a directory: {}",
                    repo_path.display()
                ))
                .with_message(format!(
                    "Repository analysis failed: not a directory: {}",
                    repo_path.display()
                )));
        }

        let scan = Self::scan(repo_path);

        let primary_language = scan
            .language_counts
            .iter()
            .max_by_key(|(_, count)| **count)
            .map(|(language, _)| language.clone())
            .unwrap_or_else(|| "unknown".to_string());

        let repo_url = state
            .repo_url
            .clone()
            .or_else(|| Self::discover_repo_url(repo_path));

        let complexity_score = Self::complexity_score(&scan);
        let confidence = Self::confidence(&scan, &primary_language);
        let structure_summary = format!(
            "{} files scanned; languages: {}; build tools: {}; ci: {}",
            scan.files_scanned,
            scan.language_counts
                .keys()
                .cloned()
                .collect::<Vec<_>>()
                .join(", "),
            scan.build_tools
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(", "),
            scan.ci_files_present
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(", "),
        );

        let analysis = RepositoryAnalysis {
            repo_path: repo_path.clone(),
            repo_url,
            primary_language: primary_language.clone(),
            languages: scan.language_counts.keys().cloned().collect(),
            frameworks: Self::frameworks(&scan.dependencies),
            build_tools: scan.build_tools.iter().cloned().collect(),
            package_managers: scan.package_managers.iter().cloned().collect(),
            dependencies: scan.dependencies.clone(),
            entry_points: scan.entry_points.iter().cloned().collect(),
            test_frameworks: scan.test_frameworks.iter().cloned().collect(),
            dockerfile_present: scan.dockerfile_present,
            docker_compose_present: scan.docker_compose_present,
            kubernetes_manifests: scan.kubernetes_manifests.iter().cloned().collect(),
            ci_files_present: scan.ci_files_present.iter().cloned().collect(),
            infrastructure_as_code: scan.infrastructure_as_code.iter().cloned().collect(),
            structure_summary,
            complexity_score,
            confidence,
        };

        let mut update = StateUpdate {
            repository_analysis: Some(analysis),
            ..Default::default()
        }
        .with_phase(WorkflowPhase::Extract)
        .with_message(format!(
            "Repository analysis complete\n  \
             primary language: {primary_language}\n  \
             complexity: {complexity_score}/10\n  \
             confidence: {:.0}%\n\
             Proceeding to pattern extraction...",
            confidence * 100.0
        ));
        for warning in scan.parse_warnings {
            update = update.with_warning(format!("manifest parse failed: {warning}"));
        }
        Ok(update)
    }
}

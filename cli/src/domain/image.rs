//! Image reference handling: name/tag splitting, Docker Hub detection and
//! rewriting references onto pull-through mirrors.

/// Pull-through mirrors of Docker Hub, tried in order when Hub rate-limits.
pub const MIRROR_REGISTRIES: &[&str] = &[
    "mirror.gcr.io",
    "public.ecr.aws/docker",
    "docker.m.daocloud.io",
];

const HUB_HOSTS: &[&str] = &["docker.io", "index.docker.io", "registry-1.docker.io"];

/// Split `name[:tag]` into its parts. Digest references (`name@sha256:...`)
/// are returned whole with no tag.
#[must_use]
pub fn split_name_tag(reference: &str) -> (&str, Option<&str>) {
    if reference.contains('@') {
        return (reference, None);
    }
    let slash = reference.rfind('/').map_or(0, |i| i + 1);
    match reference[slash..].rfind(':') {
        Some(i) => {
            let at = slash + i;
            (&reference[..at], Some(&reference[at + 1..]))
        }
        None => (reference, None),
    }
}

/// Whether the first path segment names a registry host.
fn has_registry_host(name: &str) -> bool {
    match name.split_once('/') {
        Some((first, _)) => first.contains('.') || first.contains(':') || first == "localhost",
        None => false,
    }
}

/// Whether `reference` resolves to Docker Hub.
///
/// True for bare names (`nginx`), `user/image` forms without a dotted host,
/// and explicit `docker.io` / `registry-1.docker.io` prefixes.
#[must_use]
pub fn is_docker_hub(reference: &str) -> bool {
    let (name, _) = split_name_tag(reference);
    match name.split_once('/') {
        Some((first, _)) if HUB_HOSTS.contains(&first) => true,
        _ => !has_registry_host(name),
    }
}

/// Repository path on Docker Hub, e.g. `library/nginx` or `grafana/grafana`.
#[must_use]
pub fn hub_repository(name: &str) -> String {
    let mut path = name;
    for host in HUB_HOSTS {
        if let Some(rest) = name.strip_prefix(&format!("{host}/")) {
            path = rest;
            break;
        }
    }
    if path.contains('/') {
        path.to_string()
    } else {
        format!("library/{path}")
    }
}

/// Rewrite a Docker Hub reference onto each configured mirror.
///
/// Returns an empty list for references that are not on Docker Hub.
#[must_use]
pub fn mirror_references(reference: &str) -> Vec<String> {
    if !is_docker_hub(reference) {
        return Vec::new();
    }
    let (name, tag) = split_name_tag(reference);
    if name.contains('@') {
        let (repo, digest) = name.split_once('@').unwrap_or((name, ""));
        let path = hub_repository(repo);
        return MIRROR_REGISTRIES
            .iter()
            .map(|m| format!("{m}/{path}@{digest}"))
            .collect();
    }
    let path = hub_repository(name);
    let tag = tag.unwrap_or("latest");
    MIRROR_REGISTRIES
        .iter()
        .map(|m| format!("{m}/{path}:{tag}"))
        .collect()
}

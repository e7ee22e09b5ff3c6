//! Group mutations on an in-memory registry.

use crate::core::types::{GroupMember, Registry, RepoConfig, WorkspaceManifest};
use crate::error::WorksetError;

/// Sorted group names.
pub fn list(registry: &Registry) -> Vec<String> {
    registry.groups.keys().cloned().collect()
}

/// Create a group, or update its description when one is given.
pub fn upsert(registry: &mut Registry, name: &str, description: &str) -> Result<(), WorksetError> {
    let name = required(name, "group name required")?;
    let group = registry.groups.entry(name.to_string()).or_default();
    if !description.trim().is_empty() {
        group.description = description.trim().to_string();
    }
    Ok(())
}

pub fn delete(registry: &mut Registry, name: &str) -> Result<(), WorksetError> {
    let name = required(name, "group name required")?;
    registry
        .groups
        .remove(name)
        .map(|_| ())
        .ok_or_else(|| WorksetError::not_found(format!("group {name:?} not found")))
}

/// Add `member`, replacing an existing entry for the same repo.
pub fn add_member(
    registry: &mut Registry,
    group_name: &str,
    member: GroupMember,
) -> Result<(), WorksetError> {
    let group_name = required(group_name, "group name required")?;
    required(&member.repo, "repo name required")?;
    let group = registry.groups.entry(group_name.to_string()).or_default();
    match group.members.iter_mut().find(|existing| existing.repo == member.repo) {
        Some(existing) => *existing = member,
        None => group.members.push(member),
    }
    Ok(())
}

pub fn remove_member(
    registry: &mut Registry,
    group_name: &str,
    repo: &str,
) -> Result<(), WorksetError> {
    let group_name = required(group_name, "group name required")?;
    let repo = required(repo, "repo name required")?;
    let group = registry
        .groups
        .get_mut(group_name)
        .ok_or_else(|| WorksetError::not_found(format!("group {group_name:?} not found")))?;
    let before = group.members.len();
    group.members.retain(|member| member.repo != repo);
    if group.members.len() == before {
        return Err(WorksetError::not_found(format!(
            "repo {repo:?} not found in group {group_name:?}"
        )));
    }
    Ok(())
}

/// Append the group's members that the manifest does not already list.
///
/// Returns the names of the repos that were added, in group order.
pub fn append_members(manifest: &mut WorkspaceManifest, members: &[GroupMember]) -> Vec<String> {
    let mut added = Vec::new();
    for member in members {
        if manifest.repo(&member.repo).is_some() {
            continue;
        }
        manifest.repos.push(RepoConfig {
            name: member.repo.clone(),
            repo_dir: member.repo.clone(),
            remotes: member.remotes.clone(),
            ..RepoConfig::default()
        });
        added.push(member.repo.clone());
    }
    added
}

fn required<'a>(value: &'a str, message: &str) -> Result<&'a str, WorksetError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(WorksetError::validation(message));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn member(repo: &str) -> GroupMember {
        GroupMember {
            repo: repo.to_string(),
            ..GroupMember::default()
        }
    }

    #[test]
    fn add_member_upserts_by_repo() {
        let mut registry = Registry::default();
        add_member(&mut registry, "platform", member("api")).expect("add");
        let mut updated = member("api");
        updated.remotes.base.name = "upstream".to_string();
        add_member(&mut registry, "platform", updated).expect("update");
        let group = &registry.groups["platform"];
        assert_eq!(group.members.len(), 1);
        assert_eq!(group.members[0].remotes.base.name, "upstream");
    }

    #[test]
    fn upsert_keeps_description_when_blank() {
        let mut registry = Registry::default();
        upsert(&mut registry, "platform", "core services").expect("create");
        upsert(&mut registry, "platform", "").expect("touch");
        assert_eq!(registry.groups["platform"].description, "core services");
        assert_eq!(list(&registry), vec!["platform".to_string()]);
    }

    #[test]
    fn delete_missing_group_is_not_found() {
        let mut registry = Registry::default();
        let err = delete(&mut registry, "nope").expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn remove_member_reports_unknown_repo() {
        let mut registry = Registry::default();
        add_member(&mut registry, "platform", member("api")).expect("add");
        assert!(remove_member(&mut registry, "platform", "web").is_err());
        remove_member(&mut registry, "platform", "api").expect("remove");
        assert!(registry.groups["platform"].members.is_empty());
    }

    #[test]
    fn append_skips_repos_already_in_manifest() {
        let mut manifest = WorkspaceManifest {
            name: "demo".to_string(),
            repos: vec![RepoConfig {
                name: "api".to_string(),
                ..RepoConfig::default()
            }],
        };
        let added = append_members(&mut manifest, &[member("api"), member("web")]);
        assert_eq!(added, vec!["web".to_string()]);
        assert_eq!(manifest.repos.len(), 2);
        assert_eq!(manifest.repos[1].repo_dir, "web");
    }
}

//! Files, directories, and symlinks.

use std::io::Write;
use std::os::unix::fs::PermissionsExt;

use anyhow::{bail, Context, Result};
use camino::Utf8Path;
use fn_error_context::context;

use ignition_config::v3_1::{Directory, File, Link, NodeGroup, NodeUser};
use ignition_config::Config;
use ignition_utils::join_under_root;

use crate::stages::StageContext;

const DEFAULT_FILE_MODE: u32 = 0o644;
const DEFAULT_DIR_MODE: u32 = 0o755;

pub(super) fn create_entries(ctx: &mut StageContext<'_>, config: &Config) -> Result<()> {
    let span = tracing::info_span!("createFiles");
    let _e = span.enter();

    for dir in &config.storage.directories {
        create_directory(ctx, dir)?;
    }
    for file in &config.storage.files {
        create_file(ctx, file)?;
    }
    for link in &config.storage.links {
        create_link(ctx, link)?;
    }
    Ok(())
}

#[context("Creating directory {}", dir.path)]
fn create_directory(ctx: &StageContext<'_>, dir: &Directory) -> Result<()> {
    let target = join_under_root(ctx.root, dir.path.as_str().into());
    let meta = std::fs::symlink_metadata(&target).ok();
    if let Some(meta) = &meta {
        if !meta.is_dir() {
            if dir.overwrite != Some(true) {
                bail!("{target} exists and is not a directory");
            }
            std::fs::remove_file(&target)?;
        }
    }
    std::fs::create_dir_all(&target)?;
    apply_metadata(
        ctx,
        &target,
        dir.mode.unwrap_or(DEFAULT_DIR_MODE as i32),
        &dir.user,
        &dir.group,
    )
}

#[context("Creating file {}", file.path)]
fn create_file(ctx: &StageContext<'_>, file: &File) -> Result<()> {
    let target = join_under_root(ctx.root, file.path.as_str().into());
    ensure_parent(&target)?;
    let exists = std::fs::symlink_metadata(&target).is_ok();

    if let Some(contents) = &file.contents {
        if exists && file.overwrite != Some(true) {
            bail!("{target} exists and overwrite was not requested");
        }
        let data = ctx
            .fetcher
            .fetch_resource(contents)
            .with_context(|| format!("fetching contents for {}", file.path))?
            .unwrap_or_default();
        std::fs::write(&target, data)?;
    } else if !exists {
        std::fs::write(&target, b"")?;
    }

    for resource in &file.append {
        let Some(data) = ctx
            .fetcher
            .fetch_resource(resource)
            .with_context(|| format!("fetching append contents for {}", file.path))?
        else {
            continue;
        };
        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&target)?;
        f.write_all(&data)?;
    }

    apply_metadata(
        ctx,
        &target,
        file.mode.unwrap_or(DEFAULT_FILE_MODE as i32),
        &file.user,
        &file.group,
    )
}

#[context("Creating link {}", link.path)]
fn create_link(ctx: &StageContext<'_>, link: &Link) -> Result<()> {
    let target = join_under_root(ctx.root, link.path.as_str().into());
    ensure_parent(&target)?;
    let dest = link.target.as_deref().context("link without target")?;

    if std::fs::symlink_metadata(&target).is_ok() {
        if link.overwrite != Some(true) {
            bail!("{target} exists and overwrite was not requested");
        }
        std::fs::remove_file(&target)?;
    }

    if link.hard == Some(true) {
        let dest = join_under_root(ctx.root, dest.into());
        std::fs::hard_link(&dest, &target)
            .with_context(|| format!("hard linking {target} to {dest}"))?;
    } else {
        std::os::unix::fs::symlink(dest, &target)
            .with_context(|| format!("symlinking {target} to {dest}"))?;
        // ownership applies to the link itself, never the destination
        let (uid, gid) = resolve_owner(ctx, &link.user, &link.group)?;
        std::os::unix::fs::lchown(&target, uid, gid)?;
    }
    Ok(())
}

fn ensure_parent(target: &Utf8Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating parent directories for {target}"))?;
    }
    Ok(())
}

fn apply_metadata(
    ctx: &StageContext<'_>,
    target: &Utf8Path,
    mode: i32,
    user: &NodeUser,
    group: &NodeGroup,
) -> Result<()> {
    std::fs::set_permissions(target, std::fs::Permissions::from_mode(mode as u32))
        .with_context(|| format!("setting mode on {target}"))?;
    let (uid, gid) = resolve_owner(ctx, user, group)?;
    std::os::unix::fs::chown(target, uid, gid)
        .with_context(|| format!("setting ownership on {target}"))?;
    Ok(())
}

/// Turn declared ownership into numeric ids, resolving names against the
/// target root's own passwd and group databases.
fn resolve_owner(
    ctx: &StageContext<'_>,
    user: &NodeUser,
    group: &NodeGroup,
) -> Result<(Option<u32>, Option<u32>)> {
    let uid = match (&user.id, &user.name) {
        (Some(id), _) => Some(*id as u32),
        (None, Some(name)) => Some(
            lookup_id(&join_under_root(ctx.root, "/etc/passwd".into()), name)
                .with_context(|| format!("resolving user {name:?}"))?,
        ),
        (None, None) => None,
    };
    let gid = match (&group.id, &group.name) {
        (Some(id), _) => Some(*id as u32),
        (None, Some(name)) => Some(
            lookup_id(&join_under_root(ctx.root, "/etc/group".into()), name)
                .with_context(|| format!("resolving group {name:?}"))?,
        ),
        (None, None) => None,
    };
    Ok((uid, gid))
}

/// Find `name` in a passwd/group style database and return its numeric
/// id (the third column in both formats).
fn lookup_id(db: &Utf8Path, name: &str) -> Result<u32> {
    let raw = std::fs::read_to_string(db).with_context(|| format!("reading {db}"))?;
    for line in raw.lines() {
        let mut fields = line.split(':');
        if fields.next() == Some(name) {
            let id = fields
                .nth(1)
                .with_context(|| format!("malformed entry for {name:?} in {db}"))?;
            return id.parse().with_context(|| format!("bad id for {name:?} in {db}"));
        }
    }
    bail!("no entry for {name:?} in {db}")
}

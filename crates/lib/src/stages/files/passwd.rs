//! Users and groups, realized with the shadow utilities against the
//! target root.

use std::io::Write;
use std::process::Command;

use anyhow::{Context, Result};
use fn_error_context::context;

use ignition_config::v3_1::{PasswdGroup, PasswdUser};
use ignition_config::Config;
use ignition_utils::{join_under_root, CommandRunExt};

use crate::stages::StageContext;

pub(super) fn create_passwd(ctx: &StageContext<'_>, config: &Config) -> Result<()> {
    if config.passwd.users.is_empty() && config.passwd.groups.is_empty() {
        return Ok(());
    }
    let span = tracing::info_span!("createPasswd");
    let _e = span.enter();

    for group in &config.passwd.groups {
        create_group(ctx, group)?;
    }
    for user in &config.passwd.users {
        create_user(ctx, user)?;
        write_authorized_keys(ctx, user)?;
    }
    Ok(())
}

#[context("Creating group {}", group.name)]
fn create_group(ctx: &StageContext<'_>, group: &PasswdGroup) -> Result<()> {
    let mut cmd = Command::new("groupadd");
    cmd.arg("--root").arg(ctx.root);
    if let Some(gid) = group.gid {
        cmd.arg("--gid").arg(gid.to_string());
    }
    if let Some(hash) = &group.password_hash {
        cmd.arg("--password").arg(hash);
    }
    if group.system == Some(true) {
        cmd.arg("--system");
    }
    cmd.arg(&group.name);
    cmd.log_debug().run_capture_stderr()
}

fn user_exists(ctx: &StageContext<'_>, name: &str) -> bool {
    let passwd = join_under_root(ctx.root, "/etc/passwd".into());
    std::fs::read_to_string(passwd)
        .map(|raw| {
            raw.lines()
                .any(|line| line.split(':').next() == Some(name))
        })
        .unwrap_or(false)
}

#[context("Creating user {}", user.name)]
fn create_user(ctx: &StageContext<'_>, user: &PasswdUser) -> Result<()> {
    if user_exists(ctx, &user.name) {
        return modify_user(ctx, user);
    }
    let mut cmd = Command::new("useradd");
    cmd.arg("--root").arg(ctx.root);
    if let Some(uid) = user.uid {
        cmd.arg("--uid").arg(uid.to_string());
    }
    if let Some(hash) = &user.password_hash {
        cmd.arg("--password").arg(hash);
    }
    if let Some(gecos) = &user.gecos {
        cmd.arg("--comment").arg(gecos);
    }
    if let Some(home) = &user.home_dir {
        cmd.arg("--home-dir").arg(home);
    }
    if user.no_create_home == Some(true) {
        cmd.arg("--no-create-home");
    } else {
        cmd.arg("--create-home");
    }
    if let Some(primary) = &user.primary_group {
        cmd.arg("--gid").arg(primary);
    }
    if !user.groups.is_empty() {
        cmd.arg("--groups").arg(user.groups.join(","));
    }
    if user.no_user_group == Some(true) {
        cmd.arg("--no-user-group");
    }
    if user.no_log_init == Some(true) {
        cmd.arg("--no-log-init");
    }
    if let Some(shell) = &user.shell {
        cmd.arg("--shell").arg(shell);
    }
    if user.system == Some(true) {
        cmd.arg("--system");
    }
    cmd.arg(&user.name);
    cmd.log_debug().run_capture_stderr()
}

/// The user already exists in the image; reconcile the fields that can
/// change after the fact.
fn modify_user(ctx: &StageContext<'_>, user: &PasswdUser) -> Result<()> {
    let mut cmd = Command::new("usermod");
    cmd.arg("--root").arg(ctx.root);
    let mut have_changes = false;
    if let Some(hash) = &user.password_hash {
        cmd.arg("--password").arg(hash);
        have_changes = true;
    }
    if !user.groups.is_empty() {
        cmd.arg("--append").arg("--groups").arg(user.groups.join(","));
        have_changes = true;
    }
    if let Some(shell) = &user.shell {
        cmd.arg("--shell").arg(shell);
        have_changes = true;
    }
    if !have_changes {
        return Ok(());
    }
    cmd.arg(&user.name);
    cmd.log_debug().run_capture_stderr()
}

/// Drop the declared keys into the user's authorized_keys, resolving the
/// home directory from the target root's passwd database.
fn write_authorized_keys(ctx: &StageContext<'_>, user: &PasswdUser) -> Result<()> {
    if user.ssh_authorized_keys.is_empty() {
        return Ok(());
    }
    let passwd = join_under_root(ctx.root, "/etc/passwd".into());
    let raw = std::fs::read_to_string(&passwd).with_context(|| format!("reading {passwd}"))?;
    let entry = raw
        .lines()
        .find(|line| line.split(':').next() == Some(user.name.as_str()))
        .with_context(|| format!("user {:?} missing after creation", user.name))?;
    let fields: Vec<&str> = entry.split(':').collect();
    let (uid, gid, home) = (
        fields.get(2).and_then(|f| f.parse::<u32>().ok()),
        fields.get(3).and_then(|f| f.parse::<u32>().ok()),
        fields.get(5).copied().unwrap_or_default(),
    );
    if home.is_empty() {
        tracing::warn!("user {:?} has no home directory, skipping ssh keys", user.name);
        return Ok(());
    }

    let ssh_dir = join_under_root(ctx.root, home.into()).join(".ssh");
    std::fs::create_dir_all(&ssh_dir)?;
    let path = ssh_dir.join("authorized_keys");
    let mut f = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("opening {path}"))?;
    for key in &user.ssh_authorized_keys {
        writeln!(f, "{key}")?;
    }
    drop(f);
    for p in [ssh_dir, path] {
        std::os::unix::fs::chown(&p, uid, gid)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8Path;

    use crate::fetcher::Fetcher;
    use crate::state::State;

    #[test]
    fn test_user_exists() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        std::fs::create_dir_all(root.join("etc")).unwrap();
        std::fs::write(
            root.join("etc/passwd"),
            "root:x:0:0:root:/root:/bin/bash\ncore:x:500:500::/home/core:/bin/sh\n",
        )
        .unwrap();
        let fetcher = Fetcher::new(true).unwrap();
        let mut state = State::default();
        let ctx = StageContext {
            root,
            fetcher: &fetcher,
            need_net: Utf8Path::new("/run/ignition/neednet"),
            state: &mut state,
        };
        assert!(user_exists(&ctx, "core"));
        assert!(!user_exists(&ctx, "nobody"));
    }

    #[test]
    fn test_write_authorized_keys() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        std::fs::create_dir_all(root.join("etc")).unwrap();
        std::fs::create_dir_all(root.join("home/core")).unwrap();
        std::fs::write(
            root.join("etc/passwd"),
            "core:x:500:500::/home/core:/bin/sh\n",
        )
        .unwrap();
        let fetcher = Fetcher::new(true).unwrap();
        let mut state = State::default();
        let ctx = StageContext {
            root,
            fetcher: &fetcher,
            need_net: Utf8Path::new("/run/ignition/neednet"),
            state: &mut state,
        };
        let user = PasswdUser {
            name: "core".into(),
            ssh_authorized_keys: vec!["ssh-ed25519 AAAA test".into()],
            ..Default::default()
        };
        write_authorized_keys(&ctx, &user).unwrap();
        let keys =
            std::fs::read_to_string(root.join("home/core/.ssh/authorized_keys")).unwrap();
        assert_eq!(keys, "ssh-ed25519 AAAA test\n");
    }
}

use anyhow::{Result, bail};
use std::process;

use larder_core::models::{Role, Session};
use larder_core::service::RecipeService;

use super::helpers::{print_user_table, prompt_line, prompt_new_password};

pub(crate) fn cmd_user_add(
    svc: &RecipeService,
    session: &Session,
    username: &str,
    admin: bool,
    json: bool,
) -> Result<()> {
    let password = prompt_new_password(username)?;
    let role = if admin { Role::Admin } else { Role::User };
    let user = svc.create_user(Some(session), username, &password, role)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&user)?);
    } else {
        println!("Created user: {} ({})", user.username, user.role);
    }
    Ok(())
}

pub(crate) fn cmd_user_list(svc: &RecipeService, session: &Session, json: bool) -> Result<()> {
    let users = svc.list_users(session)?;
    if users.is_empty() {
        if json {
            println!("[]");
        } else {
            eprintln!("No users found. Create the first admin with: larder user add <name> --admin");
        }
        process::exit(2);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&users)?);
    } else {
        print_user_table(&users);
    }
    Ok(())
}

pub(crate) fn cmd_user_delete(
    svc: &RecipeService,
    session: &Session,
    username: &str,
    json: bool,
) -> Result<()> {
    svc.delete_user(session, username)?;
    if json {
        println!("{}", serde_json::json!({ "deleted": username }));
    } else {
        println!("Deleted user: {username}");
    }
    Ok(())
}

pub(crate) fn cmd_user_passwd(svc: &RecipeService, session: &Session, username: &str) -> Result<()> {
    let password = prompt_new_password(username)?;
    svc.set_password(session, username, &password)?;
    println!("Password updated for {username}");
    Ok(())
}

pub(crate) fn cmd_user_role(
    svc: &RecipeService,
    session: &Session,
    username: &str,
    role: &str,
    json: bool,
) -> Result<()> {
    let role: Role = role.parse()?;
    svc.set_role(session, username, role)?;
    if json {
        println!("{}", serde_json::json!({ "username": username, "role": role }));
    } else {
        println!("{username} is now {role}");
    }
    Ok(())
}

pub(crate) fn cmd_user_login(svc: &RecipeService, username: &str, json: bool) -> Result<()> {
    let password = prompt_line(&format!("Password for {username}: "))?;
    let Some(session) = svc.login(username, &password)? else {
        bail!("Invalid username or password");
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&session)?);
    } else {
        println!("Logged in as {} ({})", session.username, session.role);
    }
    Ok(())
}

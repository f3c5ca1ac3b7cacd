mod cli;
mod prompts;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;

use ticketrel_core::{
    open_or_create, parse_ticket_ref, relation_options, render, Config, PermissionPolicy,
    Relation, RelationChoice, RelationSystem, RelationView, Ticket, TicketStatus,
    TicketWorkflow, TICKET_MODIFY, TICKET_VIEW,
};

use crate::cli::{Cli, Command, RelationCommand, TicketCommand};

/// What every command handler needs
struct AppContext {
    workflow: TicketWorkflow,
    policy: PermissionPolicy,
    user: String,
}

impl AppContext {
    fn system(&self) -> &RelationSystem {
        self.workflow.system()
    }

    fn require(&self, capability: &str) -> Result<()> {
        self.policy.require(&self.user, capability)?;
        Ok(())
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(db) = &cli.db {
        config.database = db.clone();
    }

    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", &config.log_level),
    )
    .init();

    let backend = open_or_create(&config.database)
        .with_context(|| format!("Failed to open database {}", config.database.display()))?;
    let ctx = AppContext {
        workflow: TicketWorkflow::new(RelationSystem::new(backend)),
        policy: config.permission_policy(),
        user: cli
            .user
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .unwrap_or_else(|| "anonymous".to_string()),
    };

    match &cli.command {
        Command::Init => {
            let stats = ctx.system().backend().stats()?;
            println!("{}", "Database ready.".green());
            println!("  Path: {}", config.database.display());
            println!("  Tickets: {}", stats.ticket_count);
            println!("  Relations: {}", stats.relation_count);
        }
        Command::Ticket(ticket_cmd) => {
            handle_ticket_command(ticket_cmd, &ctx)?;
        }
        Command::Rel(rel_cmd) => {
            handle_relation_command(rel_cmd, &ctx)?;
        }
    }

    Ok(())
}

/// Parse a ticket id such as `12` or `#12`
fn parse_ticket_id(id_str: &str) -> Result<i64> {
    parse_ticket_ref(id_str)
        .with_context(|| format!("Invalid ticket id: '{}'. Expected a number like 12 or #12", id_str))
}

fn handle_ticket_command(cmd: &TicketCommand, ctx: &AppContext) -> Result<()> {
    match cmd {
        TicketCommand::Add {
            summary,
            interactive,
        } => {
            ctx.require(TICKET_MODIFY)?;
            let summary = match summary {
                Some(s) if !*interactive => s.clone(),
                _ => prompts::prompt_summary()?,
            };
            let ticket = ctx.workflow.create_ticket(&summary, &ctx.user)?;
            println!("{}", "Ticket created successfully!".green());
            println!("ID: {}", format!("#{}", ticket.id).green());
        }
        TicketCommand::List { status } => {
            ctx.require(TICKET_VIEW)?;
            list_tickets(ctx, status.as_deref())?;
        }
        TicketCommand::Show { id } => {
            ctx.require(TICKET_VIEW)?;
            let ticket = ctx.system().ticket(parse_ticket_id(id)?)?;
            print_ticket(&ticket);
            println!();
            print_relations(ctx, ticket.id)?;
        }
        TicketCommand::Close {
            id,
            resolution,
            duplicate_of,
        } => {
            ctx.require(TICKET_MODIFY)?;
            let result = ctx.workflow.resolve(
                parse_ticket_id(id)?,
                resolution,
                duplicate_of.as_deref(),
                &ctx.user,
            );
            match result {
                Ok(change) => {
                    println!(
                        "{}",
                        format!("Ticket #{} closed as {}.", change.ticket.id, resolution).green()
                    );
                    if let Some(rel) = change.created_relation {
                        println!("  {}", render::added_notice(&rel).cyan());
                    }
                }
                Err(e) if e.is_user_error() => {
                    for line in e.to_string().lines() {
                        println!("{} {}", "Warning:".yellow(), line);
                    }
                    anyhow::bail!("Ticket was not closed");
                }
                Err(e) => return Err(e.into()),
            }
        }
        TicketCommand::Reopen { id } => {
            ctx.require(TICKET_MODIFY)?;
            let change = ctx.workflow.reopen(parse_ticket_id(id)?, &ctx.user)?;
            println!(
                "{}",
                format!("Ticket #{} reopened.", change.ticket.id).green()
            );
        }
    }
    Ok(())
}

fn list_tickets(ctx: &AppContext, status_filter: Option<&str>) -> Result<()> {
    let status: Option<TicketStatus> = status_filter.map(str::parse).transpose()?;
    let tickets: Vec<Ticket> = ctx
        .system()
        .backend()
        .list_tickets()?
        .into_iter()
        .filter(|t| status.map_or(true, |s| t.status == s))
        .collect();

    if tickets.is_empty() {
        println!("{}", "No tickets found.".yellow());
        return Ok(());
    }

    for ticket in tickets {
        let status = if ticket.is_closed() {
            ticket.status.to_string().dimmed()
        } else {
            ticket.status.to_string().green()
        };
        println!(
            "{:>6}  {:<9} {}",
            format!("#{}", ticket.id).yellow(),
            status,
            ticket.summary
        );
    }
    Ok(())
}

fn print_ticket(ticket: &Ticket) {
    println!("{}: #{}", "Ticket".blue(), ticket.id);
    println!("{}: {}", "Summary".blue(), ticket.summary);
    println!("{}: {}", "Status".blue(), ticket.status);
    if let Some(resolution) = &ticket.resolution {
        println!("{}: {}", "Resolution".blue(), resolution);
    }
    if !ticket.reporter.is_empty() {
        println!("{}: {}", "Reporter".blue(), ticket.reporter);
    }
    println!(
        "{}: {}",
        "Created".blue(),
        ticket.created_at.format("%Y-%m-%d %H:%M")
    );
}

fn print_relations(ctx: &AppContext, ticket: i64) -> Result<()> {
    let relations = ctx.system().relations_of(ticket)?;
    if relations.is_empty() {
        println!("{}", "No relations found.".yellow());
        return Ok(());
    }

    println!("{}:", "Relations".green());
    let views = relations
        .outgoing
        .iter()
        .map(|r| RelationView::new(r, false))
        .chain(relations.incoming.iter().map(|r| RelationView::new(r, true)));
    for view in views {
        println!(
            "  {} {}",
            format!("[{}]", view.id).dimmed(),
            view.text().cyan()
        );
    }
    Ok(())
}

fn handle_relation_command(cmd: &RelationCommand, ctx: &AppContext) -> Result<()> {
    match cmd {
        RelationCommand::Add {
            ticket,
            r#type,
            other,
        } => {
            ctx.require(TICKET_MODIFY)?;
            add_relation(ctx, ticket, r#type, other)?;
        }
        RelationCommand::Remove { ids, yes } => {
            ctx.require(TICKET_MODIFY)?;
            remove_relations(ctx, ids, *yes)?;
        }
        RelationCommand::List { ticket } => {
            ctx.require(TICKET_VIEW)?;
            let id = parse_ticket_id(ticket)?;
            ctx.system().ticket(id)?;
            print_relations(ctx, id)?;
        }
        RelationCommand::Types => {
            for option in relation_options() {
                println!("  {:<13} {}", option.value.yellow(), option.label);
            }
        }
    }
    Ok(())
}

fn add_relation(ctx: &AppContext, ticket: &str, type_str: &str, other: &str) -> Result<()> {
    let current = parse_ticket_id(ticket)?;
    let other = parse_ticket_id(other)?;
    let choice: RelationChoice = type_str.parse()?;

    let relation = ctx
        .system()
        .add_relation(Relation::from_choice(current, other, choice))?;

    println!("{}", render::added_notice(&relation).green());
    println!(
        "  {}",
        RelationView::new(&relation, choice.reversed).text().cyan()
    );
    Ok(())
}

fn remove_relations(ctx: &AppContext, ids: &[i64], skip_confirm: bool) -> Result<()> {
    let mut relations = Vec::new();
    for id in ids {
        match ctx.system().get_relation(*id)? {
            Some(rel) => relations.push(rel),
            None => println!("{} relation {} not found", "Skipping:".yellow(), id),
        }
    }
    if relations.is_empty() {
        return Ok(());
    }

    println!("{}", "Relations to delete:".yellow());
    for rel in &relations {
        println!(
            "  [{}] {}",
            rel.id.unwrap_or_default(),
            RelationView::new(rel, false).text()
        );
    }

    if !skip_confirm && !prompts::confirm_removal(&relations)? {
        println!("{}", "Deletion cancelled.".yellow());
        return Ok(());
    }

    for rel in relations {
        if let Some(id) = rel.id {
            if let Some(removed) = ctx.system().delete_relation(id)? {
                println!("{}", render::deleted_notice(&removed).green());
            }
        }
    }
    Ok(())
}

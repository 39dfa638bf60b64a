use clap::{Arg, ArgMatches, Command};
use std::error::Error;
use std::path;
use std::sync::Arc;

use broadcastr::backend::memory::MemoryNetwork;
use broadcastr::logging::init_tracing;
use broadcastr::{
	Backends, Broadcaster, Config, ContainerId, ItemRef, LinkStore, LinkViolation, Operation,
	Permissions, UserId,
};

///////////////////////
// Utility functions //
///////////////////////

fn load_config(matches: &ArgMatches) -> Result<Config, Box<dyn Error>> {
	let mut config = match matches.get_one::<String>("config") {
		Some(file) => Config::load(path::Path::new(file))?,
		None => Config::default(),
	};
	config.apply_env()?;
	if let Some(db) = matches.get_one::<String>("database") {
		config.database_path = path::PathBuf::from(db);
	}
	config.validate()?;
	Ok(config)
}

fn item_arg(matches: &ArgMatches) -> Result<ItemRef, Box<dyn Error>> {
	let raw = matches.get_one::<String>("item").ok_or("item argument required")?;
	Ok(raw.parse::<ItemRef>()?)
}

/// Link maintenance needs only the store. No content backend is reachable
/// from the command line, so the broadcaster runs over an empty network.
fn offline_broadcaster(config: Config) -> Result<Broadcaster, Box<dyn Error>> {
	let store = Arc::new(LinkStore::open(&config.database_path)?);
	let network = Arc::new(MemoryNetwork::new());
	Ok(Broadcaster::new(Backends::from_shared(network), store, config)?)
}

fn links_command(broadcaster: &Broadcaster, op: &Operation, matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
	if let Some(sub) = matches.subcommand_matches("show") {
		let item = item_arg(sub)?;
		let record = broadcaster.store().get(item)?;
		println!("{}", item);
		match record.parent() {
			Some(parent) => println!("  parent: {}", parent),
			None => println!("  parent: -"),
		}
		for child in record.children() {
			println!("  child:  {}", child);
		}
	} else if let Some(sub) = matches.subcommand_matches("unlink") {
		let item = item_arg(sub)?;
		if sub.get_flag("from-parent") {
			match broadcaster.unlink_from_parent(op, item)? {
				Some(parent) => println!("unlinked {} from {}", item, parent),
				None => println!("{} has no parent", item),
			}
		} else if let Some(container) = sub.get_one::<String>("container") {
			let child = broadcaster.unlink_child(op, item, container.parse::<ContainerId>()?)?;
			println!("unlinked {}", child);
		} else {
			let children = broadcaster.unlink_all(op, item)?;
			println!("unlinked {} children of {}", children.len(), item);
		}
	} else if matches.subcommand_matches("check").is_some() {
		let violations = broadcaster.store().verify_symmetry()?;
		for v in &violations {
			match v {
				LinkViolation::ChildMissingParent { parent, child } => {
					println!("{} lists {} but it does not point back", parent, child)
				}
				LinkViolation::ParentMissingChild { parent, child } => {
					println!("{} points at {} which does not list it", child, parent)
				}
			}
		}
		if !violations.is_empty() {
			return Err(format!("{} broken links", violations.len()).into());
		}
		println!("all links are symmetric");
	}
	Ok(())
}

fn groups_command(broadcaster: &Broadcaster, op: &Operation, matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
	if matches.subcommand_matches("list").is_some() {
		for (id, group) in broadcaster.groups(op)? {
			let containers: Vec<String> = group.containers.iter().map(|c| c.to_string()).collect();
			println!("{}: {} [{}]", id, group.name, containers.join(", "));
		}
	} else if let Some(sub) = matches.subcommand_matches("create") {
		let name = sub.get_one::<String>("name").ok_or("create: group name required")?;
		let id = broadcaster.create_group(op, name)?;
		println!("created group {}", id);
	} else if let Some(sub) = matches.subcommand_matches("delete") {
		let id = sub.get_one::<String>("id").ok_or("delete: group id required")?.parse::<u32>()?;
		if !broadcaster.delete_group(op, id)? {
			return Err(format!("no such group: {}", id).into());
		}
		println!("deleted group {}", id);
	}
	Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
	let item = || Arg::new("item").required(true).value_name("CONTAINER/ITEM");
	let matches = Command::new("broadcastr")
		.version("0.1.0")
		.author("Szilard Hajba <szilu@symbion.hu>")
		.about("Link maintenance for broadcast content")
		.subcommand_required(true)
		.arg(Arg::new("config").short('c').long("config").value_name("FILE").global(true).help("Config file"))
		.arg(Arg::new("database").long("database").value_name("FILE").global(true).help("Link database"))
		.arg(
			Arg::new("user")
				.short('u')
				.long("user")
				.value_name("USER")
				.default_value("1")
				.global(true)
				.help("Acting user id"),
		)
		.subcommand(
			Command::new("links")
				.about("Inspect and repair parent/child links")
				.subcommand_required(true)
				.subcommand(Command::new("show").about("Show the links of an item").arg(item()))
				.subcommand(
					Command::new("unlink")
						.about("Forget links, content is untouched")
						.arg(item())
						.arg(
							Arg::new("container")
								.long("container")
								.value_name("CONTAINER")
								.help("Only the child on this container"),
						)
						.arg(
							Arg::new("from-parent")
								.long("from-parent")
								.action(clap::ArgAction::SetTrue)
								.conflicts_with("container")
								.help("Unlink the item from its parent instead"),
						),
				)
				.subcommand(Command::new("check").about("Report one-sided links")),
		)
		.subcommand(
			Command::new("groups")
				.about("Manage container groups")
				.subcommand_required(true)
				.subcommand(Command::new("list").about("List groups"))
				.subcommand(Command::new("create").about("Create a group").arg(Arg::new("name").required(true)))
				.subcommand(Command::new("delete").about("Delete a group").arg(Arg::new("id").required(true))),
		)
		.subcommand(Command::new("config").about("Print the effective configuration"))
		.get_matches();

	let config = load_config(&matches)?;
	init_tracing(&config.log_level);

	if matches.subcommand_matches("config").is_some() {
		print!("{}", toml::to_string_pretty(&config)?);
		return Ok(());
	}

	let user = matches.get_one::<String>("user").ok_or("user id required")?.parse::<UserId>()?;
	let op = Operation::new(user, Permissions::all());
	let broadcaster = offline_broadcaster(config)?;

	if let Some(sub) = matches.subcommand_matches("links") {
		links_command(&broadcaster, &op, sub)?;
	} else if let Some(sub) = matches.subcommand_matches("groups") {
		groups_command(&broadcaster, &op, sub)?;
	}

	Ok(())
}

// vim: ts=4

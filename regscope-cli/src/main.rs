use std::{path, time::Duration};

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use log::warn;
use regex::Regex;
use regscope::{
    format, Catalog, EditPolicy, FieldSelector, ItemFilter, RegisterValue, SessionConfig,
    WorkingSet,
};

#[derive(Parser)]
#[command(version, about, long_about = None, author = clap::crate_authors!(), subcommand_required = true)]
struct Cli {
    /// JSON catalog of register templates
    #[arg(long, required = true)]
    catalog: path::PathBuf,

    #[command(flatten)]
    verbose: clap_verbosity_flag::Verbosity<clap_verbosity_flag::WarnLevel>,

    /// How long to wait for each response from the board
    #[arg(long, default_value_t = 1000)]
    timeout_ms: u64,

    /// Device id of the board
    #[arg(long, default_value_t = 1)]
    board: u32,

    /// I2C bus of the sensor on the board
    #[arg(long, default_value_t = 1)]
    bus: u8,

    /// I2C address of the sensor
    #[arg(long, default_value = "0x52", value_parser = clap_num::maybe_hex::<u16>)]
    dev_addr: u16,

    /// Accept edits to read-only fields
    #[arg(long, action = clap::ArgAction::SetTrue)]
    allow_read_only: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// List the registers in the catalog
    Ls {
        /// Only list registers whose name matches this regex
        #[arg(long)]
        allow: Option<Regex>,
        /// Omit registers whose name matches this regex
        #[arg(long)]
        block: Option<Regex>,
        /// Only list the registers with exactly these names
        #[arg(long, num_args = 1.., conflicts_with_all = ["allow", "block"])]
        only: Vec<String>,
        #[arg(long, default_value = "address")]
        sorting: Sorting,
    },
    /// Print the registers of a value file with their decoded fields
    Show {
        values: path::PathBuf,
        /// Only show the register at this address
        #[arg(long, value_parser = clap_num::maybe_hex::<u64>)]
        address: Option<u64>,
    },
    /// Set the whole value of a register in a value file
    ///
    /// The file is created if it does not exist. A register missing from the file is added.
    Set {
        values: path::PathBuf,
        #[arg(value_parser = clap_num::maybe_hex::<u64>)]
        address: u64,
        #[arg(value_parser = clap_num::maybe_hex::<u64>)]
        value: u64,
    },
    /// Set the value of one field of a register in a value file
    #[command(name = "set-field")]
    SetField {
        values: path::PathBuf,
        #[arg(value_parser = clap_num::maybe_hex::<u64>)]
        address: u64,
        /// Field name, or `#<index>` to pick by position
        field: FieldSelector,
        #[arg(value_parser = clap_num::maybe_hex::<u64>)]
        value: u64,
    },
    /// Read registers from the sensor
    Read {
        /// Serial device the board is attached to, configured beforehand (e.g., with stty)
        device: path::PathBuf,
        /// Registers to read. Reads every register of `--values` if omitted.
        #[arg(value_parser = clap_num::maybe_hex::<u64>)]
        addresses: Vec<u64>,
        /// Store the values that were read into this value file
        #[arg(long)]
        values: Option<path::PathBuf>,
    },
    /// Write registers to the sensor
    Write {
        /// Serial device the board is attached to, configured beforehand (e.g., with stty)
        device: path::PathBuf,
        /// Registers to write. Writes every register of `--values` if omitted.
        #[arg(value_parser = clap_num::maybe_hex::<u64>)]
        addresses: Vec<u64>,
        /// Value to write, requires exactly one address
        #[arg(long, value_parser = clap_num::maybe_hex::<u64>, conflicts_with = "values")]
        value: Option<u64>,
        /// Take the values to write from this value file
        #[arg(long)]
        values: Option<path::PathBuf>,
    },
    /// Query the hardware and firmware versions of the board
    Version {
        /// Serial device the board is attached to, configured beforehand (e.g., with stty)
        device: path::PathBuf,
    },
}

#[derive(Clone, Copy)]
enum Sorting {
    Address,
    Name,
}

impl ValueEnum for Sorting {
    fn value_variants<'a>() -> &'a [Self] {
        &[Sorting::Address, Sorting::Name]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        use clap::builder::PossibleValue;
        match self {
            Sorting::Address => Some(PossibleValue::new("address")),
            Sorting::Name => Some(PossibleValue::new("name")),
        }
    }
}

impl Cli {
    fn session_config(&self) -> SessionConfig {
        SessionConfig::default()
            .timeout(Duration::from_millis(self.timeout_ms))
            .board_id(self.board)
            .bus(self.bus)
            .dev_addr(self.dev_addr)
    }

    fn edit_policy(&self) -> EditPolicy {
        if self.allow_read_only {
            EditPolicy::AllowReadOnly
        } else {
            EditPolicy::RejectReadOnly
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::new()
        .filter_level(cli.verbose.log_level_filter())
        .init();

    let catalog = regscope::load_catalog(&cli.catalog)
        .with_context(|| format!("could not load catalog {}", cli.catalog.display()))?;

    if let Some(cmd) = &cli.command {
        match cmd {
            Command::Ls {
                allow,
                block,
                only,
                sorting,
            } => {
                let filter = if only.is_empty() {
                    ItemFilter::regex(allow.clone(), block.clone())
                } else {
                    ItemFilter::list(Some(only.clone()), vec![])
                };
                ls(&catalog, &filter, *sorting)
            }
            Command::Show { values, address } => show(&catalog, values, *address)?,
            Command::Set {
                values,
                address,
                value,
            } => {
                let mut set = load_or_empty(&catalog, values)?;
                set.insert(*address)?;
                set.set_register(*address, *value)
                    .with_context(|| format!("cannot set register {address:#x}"))?;
                save(values, &set)?;
                print_register(set_member(&set, *address)?);
            }
            Command::SetField {
                values,
                address,
                field,
                value,
            } => {
                let mut set = load_or_empty(&catalog, values)?;
                set.insert(*address)?;
                set.edit_field(*address, field, *value, cli.edit_policy())
                    .with_context(|| format!("cannot set field {field} of register {address:#x}"))?;
                save(values, &set)?;
                print_register(set_member(&set, *address)?);
            }
            Command::Read {
                device,
                addresses,
                values,
            } => read(&cli, &catalog, device, addresses, values.as_deref())?,
            Command::Write {
                device,
                addresses,
                value,
                values,
            } => write(&cli, &catalog, device, addresses, *value, values.as_deref())?,
            Command::Version { device } => {
                let mut session = regscope::open_serial(device, cli.session_config())
                    .with_context(|| format!("cannot open {}", device.display()))?;
                let hw = session
                    .hardware_version()
                    .context("hardware version query failed")?;
                let fw = session
                    .firmware_version()
                    .context("firmware version query failed")?;
                session.close();
                println!("hardware: {hw}");
                println!("firmware: {fw}");
            }
        }
    } else {
        println!("Nothing to do. Please issue a subcommand.")
    }

    Ok(())
}

fn ls(catalog: &Catalog, filter: &ItemFilter, sorting: Sorting) {
    let mut registers = catalog.filter(filter).collect::<Vec<_>>();
    if let Sorting::Name = sorting {
        registers.sort_by(|a, b| a.name.cmp(&b.name));
    }
    for reg in registers {
        println!(
            "{}  {:<48} {:>2} bits  reset {}  {} fields",
            format::format_address(reg.address),
            reg.name,
            reg.bits,
            format::format_hex(reg.reset_value, reg.bits),
            reg.fields().len()
        );
    }
}

fn show(catalog: &Catalog, values: &path::Path, address: Option<u64>) -> anyhow::Result<()> {
    let set = regscope::load_values(catalog, values)
        .with_context(|| format!("cannot load value file {}", values.display()))?;
    match address {
        Some(address) => print_register(set_member(&set, address)?),
        None => set.iter().for_each(print_register),
    }
    Ok(())
}

fn print_register(reg: &RegisterValue) {
    let spec = reg.spec();
    println!(
        "{}  {} = {}",
        format::format_address(reg.address()),
        spec.name,
        format::format_hex(reg.value(), spec.bits)
    );
    for (index, field) in reg.fields().iter().enumerate() {
        println!(
            "    #{index:<2} {:<48} = {}  ({})",
            field.spec().to_string(),
            format::format_hex(field.value(), field.spec().bits),
            field.spec().access
        );
    }
}

fn set_member<'s, 'c>(set: &'s WorkingSet<'c>, address: u64) -> anyhow::Result<&'s RegisterValue<'c>> {
    set.get(address)
        .ok_or_else(|| anyhow!("register {address:#x} is not in the value file"))
}

fn load_or_empty<'c>(catalog: &'c Catalog, values: &path::Path) -> anyhow::Result<WorkingSet<'c>> {
    if values.exists() {
        regscope::load_values(catalog, values)
            .with_context(|| format!("cannot load value file {}", values.display()))
    } else {
        warn!("{} does not exist, starting from an empty value file", values.display());
        Ok(WorkingSet::new(catalog))
    }
}

fn save(values: &path::Path, set: &WorkingSet) -> anyhow::Result<()> {
    regscope::save_values(values, set)
        .with_context(|| format!("cannot write value file {}", values.display()))
}

fn read(
    cli: &Cli,
    catalog: &Catalog,
    device: &path::Path,
    addresses: &[u64],
    values: Option<&path::Path>,
) -> anyhow::Result<()> {
    let mut set = match values {
        Some(values) => load_or_empty(catalog, values)?,
        None => WorkingSet::new(catalog),
    };
    let addresses = if addresses.is_empty() {
        set.iter().map(RegisterValue::address).collect::<Vec<_>>()
    } else {
        addresses.to_vec()
    };
    if addresses.is_empty() {
        bail!("no registers to read");
    }

    let mut session = regscope::open_serial(device, cli.session_config())
        .with_context(|| format!("cannot open {}", device.display()))?;
    for address in addresses {
        let spec = catalog
            .get(address)
            .ok_or_else(|| anyhow!("register {address:#x} is not in the catalog"))?;
        let value = session
            .read_register(spec)
            .with_context(|| format!("cannot read {}", spec.name))?;
        set.insert(address)?;
        set.set_register(address, value)?;
        print_register(set_member(&set, address)?);
    }
    session.close();

    if let Some(values) = values {
        save(values, &set)?;
    }
    Ok(())
}

fn write(
    cli: &Cli,
    catalog: &Catalog,
    device: &path::Path,
    addresses: &[u64],
    value: Option<u64>,
    values: Option<&path::Path>,
) -> anyhow::Result<()> {
    let writes = match (value, values) {
        (Some(value), _) => match addresses {
            [address] => vec![(*address, value)],
            _ => bail!("--value requires exactly one address"),
        },
        (None, Some(values)) => {
            let set = regscope::load_values(catalog, values)
                .with_context(|| format!("cannot load value file {}", values.display()))?;
            if addresses.is_empty() {
                set.iter().map(|reg| (reg.address(), reg.value())).collect()
            } else {
                addresses
                    .iter()
                    .map(|&address| set_member(&set, address).map(|reg| (address, reg.value())))
                    .collect::<anyhow::Result<Vec<_>>>()?
            }
        }
        (None, None) => bail!("nothing to write, give --value or --values"),
    };

    let mut session = regscope::open_serial(device, cli.session_config())
        .with_context(|| format!("cannot open {}", device.display()))?;
    let mut failures = 0;
    for (address, value) in writes {
        let spec = catalog
            .get(address)
            .ok_or_else(|| anyhow!("register {address:#x} is not in the catalog"))?;
        let ack = session
            .write_register(spec, value)
            .with_context(|| format!("cannot write {value:#x} to {}", spec.name))?;
        if ack.is_success() {
            println!(
                "{}  {} <- {}",
                format::format_address(address),
                spec.name,
                format::format_hex(value, spec.bits)
            );
        } else {
            eprintln!("{}: device reported failure", spec.name);
            failures += 1;
        }
    }
    session.close();

    if failures > 0 {
        bail!("{failures} write(s) failed");
    }
    Ok(())
}

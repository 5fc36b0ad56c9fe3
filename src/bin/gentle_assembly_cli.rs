use gentle_assembly::{
    AssemblyConfig, Backbone, Planner,
    blast::BlastMatchSource,
    graph::InputFragment,
    io::read_sequences,
    primer3::Primer3Designer,
    primers::{PrimerDesigner, TmPrimerDesigner},
    protocol::PlanOutput,
    store::{EnzymeStore, FeatureStore},
};
use std::{env, path::PathBuf};
use tracing_subscriber::EnvFilter;

const DEFAULT_ENZYMES_DB: &str = "enzymes.tsv";
const DEFAULT_FEATURES_DB: &str = "features.tsv";

fn usage() {
    eprintln!(
        "Usage:\n  \
  gentle_assembly_cli --version\n  \
  gentle_assembly_cli sequence --in FASTA --dbs DB[,DB..] [OPTIONS]\n  \
  gentle_assembly_cli fragments --in FASTA [OPTIONS]\n  \
  gentle_assembly_cli features 'NAME[:rev],NAME..' --dbs DB[,DB..] [OPTIONS]\n  \
  gentle_assembly_cli enzyme ls|find|set|delete [NAME] [RECOGNITION]\n  \
  gentle_assembly_cli feature ls|find|set|delete [NAME] [SEQUENCE]\n\n  \
  Options:\n  \
  --config JSON        cost model and search settings\n  \
  --out PATH           write the plan here instead of stdout\n  \
  --backbone NAME      feature to close the vector with, needs --enzyme\n  \
  --enzyme NAME        enzyme linearizing the backbone\n  \
  --primer3            design primers with primer3_core\n  \
  --enzymes-db PATH    default {DEFAULT_ENZYMES_DB}\n  \
  --features-db PATH   default {DEFAULT_FEATURES_DB}\n\n  \
  Set RUST_LOG to change the log level"
    );
}

#[derive(Debug, Default)]
struct Options {
    positional: Vec<String>,
    input: Option<String>,
    dbs: Vec<PathBuf>,
    config: Option<String>,
    out: Option<String>,
    backbone: Option<String>,
    enzyme: Option<String>,
    primer3: bool,
    enzymes_db: Option<String>,
    features_db: Option<String>,
}

impl Options {
    fn parse(args: &[String]) -> Result<Self, String> {
        let mut ret = Self::default();
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            let mut value = || {
                iter.next()
                    .cloned()
                    .ok_or_else(|| format!("Missing value for {arg}"))
            };
            match arg.as_str() {
                "--in" => ret.input = Some(value()?),
                "--dbs" => {
                    ret.dbs = value()?
                        .split(',')
                        .map(str::trim)
                        .filter(|db| !db.is_empty())
                        .map(PathBuf::from)
                        .collect()
                }
                "--config" => ret.config = Some(value()?),
                "--out" => ret.out = Some(value()?),
                "--backbone" => ret.backbone = Some(value()?),
                "--enzyme" => ret.enzyme = Some(value()?),
                "--enzymes-db" => ret.enzymes_db = Some(value()?),
                "--features-db" => ret.features_db = Some(value()?),
                "--primer3" => ret.primer3 = true,
                other if other.starts_with("--") => return Err(format!("Unknown option {other}")),
                other => ret.positional.push(other.to_string()),
            }
        }
        Ok(ret)
    }

    fn config(&self) -> Result<AssemblyConfig, String> {
        match &self.config {
            Some(path) => AssemblyConfig::load_from_path(path).map_err(|e| e.to_string()),
            None => Ok(AssemblyConfig::default()),
        }
    }

    fn enzyme_store(&self) -> Result<EnzymeStore, String> {
        let path = self.enzymes_db.as_deref().unwrap_or(DEFAULT_ENZYMES_DB);
        EnzymeStore::open(path).map_err(|e| e.to_string())
    }

    fn feature_store(&self) -> Result<FeatureStore, String> {
        let path = self.features_db.as_deref().unwrap_or(DEFAULT_FEATURES_DB);
        FeatureStore::open(path).map_err(|e| e.to_string())
    }

    fn designer(&self, conf: &AssemblyConfig) -> Box<dyn PrimerDesigner> {
        let min_homology = conf.fragments.min_homology;
        match self.primer3 {
            true => Box::new(Primer3Designer::new(&conf.pcr, min_homology)),
            false => Box::new(TmPrimerDesigner::new(&conf.pcr, min_homology)),
        }
    }

    fn backbone(&self, conf: &AssemblyConfig) -> Result<Option<Backbone>, String> {
        let (name, enzyme) = match (&self.backbone, &self.enzyme) {
            (None, None) => return Ok(None),
            (Some(name), Some(enzyme)) => (name, enzyme),
            _ => return Err("--backbone and --enzyme go together".to_string()),
        };
        let features = self.feature_store()?;
        let seq = features.get(name).map_err(|e| e.to_string())?;
        let enzyme = self
            .enzyme_store()?
            .get(enzyme)
            .map_err(|e| e.to_string())?;
        Backbone::digest(name, seq, &enzyme, conf)
            .map(Some)
            .map_err(|e| e.to_string())
    }

    fn input(&self) -> Result<&str, String> {
        self.input
            .as_deref()
            .ok_or_else(|| "Missing --in".to_string())
    }

    fn require_dbs(&self) -> Result<&[PathBuf], String> {
        if self.dbs.is_empty() {
            return Err("Missing --dbs".to_string());
        }
        Ok(&self.dbs)
    }
}

fn write_plan(plan: &PlanOutput, out: Option<&str>) -> Result<(), String> {
    match out {
        Some(path) => {
            plan.save_to_path(path).map_err(|e| e.to_string())?;
            eprintln!(
                "Wrote {} assemblies for '{}' to '{path}'",
                plan.assemblies.len(),
                plan.target_id
            );
        }
        None => println!("{}", plan.to_json_pretty().map_err(|e| e.to_string())?),
    }
    Ok(())
}

fn plan(command: &str, opts: &Options) -> Result<(), String> {
    let conf = opts.config()?;
    let designer = opts.designer(&conf);
    let planner = Planner::new(&conf, designer.as_ref());
    let backbone = opts.backbone(&conf)?;
    let source = BlastMatchSource::default();

    let plan = match command {
        "sequence" => {
            let input = opts.input()?;
            let records = read_sequences(input).map_err(|e| e.to_string())?;
            let target = &records[0];
            planner
                .plan_sequence(
                    &target.id,
                    &target.seq,
                    &source,
                    opts.require_dbs()?,
                    backbone.as_ref(),
                )
                .map_err(|e| e.to_string())?
        }
        "fragments" => {
            let input = opts.input()?;
            let fragments: Vec<InputFragment> = read_sequences(input)
                .map_err(|e| e.to_string())?
                .iter()
                .map(|r| InputFragment::new(&r.id, &r.seq))
                .collect();
            let id = std::path::Path::new(input)
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "fragments".to_string());
            planner
                .plan_fragments(&id, &fragments, backbone.as_ref())
                .map_err(|e| e.to_string())?
        }
        _ => {
            let query = opts
                .positional
                .first()
                .ok_or_else(|| "Missing feature list".to_string())?;
            let store = opts.feature_store()?;
            planner
                .plan_features(query, &store, &source, opts.require_dbs()?, backbone.as_ref())
                .map_err(|e| e.to_string())?
        }
    };
    write_plan(&plan, opts.out.as_deref())
}

fn print_entries(entries: &[(&str, &str)]) {
    for (name, seq) in entries {
        println!("{name}\t{seq}");
    }
}

fn manage_store(kind: &str, opts: &Options) -> Result<(), String> {
    let Some(action) = opts.positional.first() else {
        usage();
        return Err(format!("Missing action for {kind}"));
    };
    let name = opts.positional.get(1);
    let value = opts.positional.get(2);
    let missing = |what: &str| format!("Missing {what} for {kind} {action}");
    match (kind, action.as_str()) {
        ("enzyme", "ls") => print_entries(&opts.enzyme_store()?.entries()),
        ("feature", "ls") => print_entries(&opts.feature_store()?.entries()),
        ("enzyme", "find") => {
            let name = name.ok_or_else(|| missing("name"))?;
            print_entries(&opts.enzyme_store()?.find(name))
        }
        ("feature", "find") => {
            let name = name.ok_or_else(|| missing("name"))?;
            print_entries(&opts.feature_store()?.find(name))
        }
        (_, "set") => {
            let name = name.ok_or_else(|| missing("name"))?;
            let value = value.ok_or_else(|| missing("sequence"))?;
            let existed = match kind {
                "enzyme" => opts.enzyme_store()?.set(name, value),
                _ => opts.feature_store()?.set(name, value),
            }
            .map_err(|e| e.to_string())?;
            println!("{} {kind} '{name}'", if existed { "Updated" } else { "Added" });
        }
        (_, "delete") => {
            let name = name.ok_or_else(|| missing("name"))?;
            let existed = match kind {
                "enzyme" => opts.enzyme_store()?.delete(name),
                _ => opts.feature_store()?.delete(name),
            }
            .map_err(|e| e.to_string())?;
            if !existed {
                return Err(format!("No {kind} named '{name}'"));
            }
            println!("Deleted {kind} '{name}'");
        }
        _ => {
            usage();
            return Err(format!("Unknown action '{action}' for {kind}"));
        }
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    if let Err(e) = run() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let args: Vec<String> = env::args().collect();
    if args.len() <= 1 {
        usage();
        return Err("Missing command".to_string());
    }
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!(
            "gentle_assembly_cli {} (build {})",
            env!("CARGO_PKG_VERSION"),
            env!("GENTLE_ASSEMBLY_BUILD_N")
        );
        return Ok(());
    }

    let command = args[1].as_str();
    let opts = Options::parse(&args[2..])?;
    match command {
        "sequence" | "fragments" | "features" => plan(command, &opts),
        "enzyme" | "feature" => manage_store(command, &opts),
        "help" | "--help" | "-h" => {
            usage();
            Ok(())
        }
        other => {
            usage();
            Err(format!("Unknown command '{other}'"))
        }
    }
}

use std::time::{Duration, Instant};

use anyhow::Context as _;
use phylo_layout::{AnyTreeLayout, LayoutKind, PhyloTree, TreeLayout as _, TreeSpec};
use sha2::Digest as _;

#[derive(Clone, Debug)]
struct BenchArgs {
    tips: usize,
    shape: Shape,
    warmup: u32,
    repeats: u32,
    kinds: Vec<LayoutKind>,
    fish_eye: f64,
}

#[derive(Clone, Copy, Debug)]
enum Shape {
    Balanced,
    Caterpillar,
}

#[derive(Clone, Debug, Default)]
struct RunMetrics {
    layout: Duration,
    serialize: Duration,
}

fn main() {
    if let Err(err) = try_main() {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

fn try_main() -> anyhow::Result<()> {
    let args = parse_args()?;
    if args.tips < 2 {
        anyhow::bail!("--tips must be >= 2");
    }
    if args.repeats == 0 {
        anyhow::bail!("--repeats must be >= 1");
    }

    let tree = build_tree(args.shape, args.tips)?;
    eprintln!(
        "tree: {shape:?}, {tips} tips, {nodes} nodes",
        shape = args.shape,
        tips = args.tips,
        nodes = tree.nodes().count()
    );

    for &kind in &args.kinds {
        let mut layout = AnyTreeLayout::new(kind);
        let _ = layout.set_fish_eye(args.fish_eye);

        for _ in 0..args.warmup {
            let _ = run_once(&layout, &tree)?;
        }

        let mut runs = Vec::with_capacity(args.repeats as usize);
        let mut digest: Option<String> = None;
        for run_idx in 0..args.repeats {
            let (m, d) = run_once(&layout, &tree)?;
            runs.push(m);
            match &digest {
                Some(first) if *first != d => {
                    anyhow::bail!(
                        "{kind}: run {run_idx} produced a different cache ({d} != {first})"
                    )
                }
                Some(_) => {}
                None => digest = Some(d),
            }
        }
        let digest = digest.unwrap_or_default();

        eprintln!(
            "\n{kind}: {repeats} run(s) ({profile} build), sha256 {digest}",
            repeats = args.repeats,
            profile = if cfg!(debug_assertions) {
                "debug"
            } else {
                "release"
            },
        );
        report_percentiles(&runs);
    }
    Ok(())
}

fn run_once(layout: &AnyTreeLayout, tree: &PhyloTree) -> anyhow::Result<(RunMetrics, String)> {
    let mut m = RunMetrics::default();

    let t = Instant::now();
    let cache = layout
        .layout(tree)
        .with_context(|| format!("{} layout", layout.kind()))?;
    m.layout = t.elapsed();

    let t = Instant::now();
    let bytes = serde_json::to_vec(&cache).context("serialize cache")?;
    m.serialize = t.elapsed();

    Ok((m, sha256_hex(&bytes)))
}

fn build_tree(shape: Shape, tips: usize) -> anyhow::Result<PhyloTree> {
    let spec = match shape {
        Shape::Balanced => balanced(0, tips),
        Shape::Caterpillar => caterpillar(tips),
    };
    PhyloTree::from_spec(&spec).context("build benchmark tree")
}

fn balanced(first: usize, tips: usize) -> TreeSpec {
    if tips == 1 {
        return TreeSpec::tip(format!("t{first}"), 1.0 + (first % 7) as f64 * 0.1);
    }
    let left = tips / 2;
    TreeSpec::clade(
        vec![balanced(first, left), balanced(first + left, tips - left)],
        0.5,
    )
}

fn caterpillar(tips: usize) -> TreeSpec {
    let mut spec = TreeSpec::tip(format!("t{}", tips - 1), 1.0);
    for i in (0..tips - 1).rev() {
        spec = TreeSpec::clade(vec![TreeSpec::tip(format!("t{i}"), 1.0), spec], 0.25);
    }
    spec
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = sha2::Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

fn parse_args() -> anyhow::Result<BenchArgs> {
    let mut args = std::env::args().skip(1);

    let mut out = BenchArgs {
        tips: 4096,
        shape: Shape::Balanced,
        warmup: 2,
        repeats: 50,
        kinds: vec![LayoutKind::Rectilinear, LayoutKind::Polar, LayoutKind::Radial],
        fish_eye: 0.0,
    };

    while let Some(a) = args.next() {
        match a.as_str() {
            "--tips" => out.tips = parse_usize(args.next(), "--tips")?,
            "--warmup" => out.warmup = parse_u32(args.next(), "--warmup")?,
            "--repeats" => out.repeats = parse_u32(args.next(), "--repeats")?,
            "--fish-eye" => {
                let v = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("missing value for --fish-eye"))?;
                out.fish_eye = v
                    .parse::<f64>()
                    .with_context(|| format!("parse --fish-eye value '{v}'"))?;
            }
            "--shape" => {
                let v = args.next().ok_or_else(|| {
                    anyhow::anyhow!("missing value for --shape (balanced|caterpillar)")
                })?;
                out.shape = match v.as_str() {
                    "balanced" => Shape::Balanced,
                    "caterpillar" => Shape::Caterpillar,
                    _ => anyhow::bail!("unknown --shape '{v}' (expected balanced|caterpillar)"),
                };
            }
            "--kind" => {
                let v = args.next().ok_or_else(|| {
                    anyhow::anyhow!("missing value for --kind (rectilinear|polar|radial)")
                })?;
                out.kinds = vec![match v.as_str() {
                    "rectilinear" => LayoutKind::Rectilinear,
                    "polar" => LayoutKind::Polar,
                    "radial" => LayoutKind::Radial,
                    _ => anyhow::bail!("unknown --kind '{v}'"),
                }];
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => anyhow::bail!("unknown arg '{a}' (try --help)"),
        }
    }

    Ok(out)
}

fn print_help() {
    eprintln!(
        r#"phylo-layout-bench

Lays out a synthetic tree repeatedly and reports p50/p90/p99 per stage.

Usage:
  cargo run -q --release
  cargo run -q --release -- --tips 20000 --kind polar
  cargo run -q --release -- --shape caterpillar --tips 2000

Args:
  --tips N         (default 4096)
  --shape S        balanced|caterpillar (default balanced)
  --kind K         rectilinear|polar|radial (default: all three)
  --fish-eye F     lens magnification (default 0)
  --warmup N       (default 2)
  --repeats N      (default 50)
"#
    );
}

fn parse_u32(v: Option<String>, flag: &str) -> anyhow::Result<u32> {
    let v = v.ok_or_else(|| anyhow::anyhow!("missing value for {flag}"))?;
    v.parse::<u32>()
        .with_context(|| format!("parse {flag} value '{v}'"))
}

fn parse_usize(v: Option<String>, flag: &str) -> anyhow::Result<usize> {
    let v = v.ok_or_else(|| anyhow::anyhow!("missing value for {flag}"))?;
    v.parse::<usize>()
        .with_context(|| format!("parse {flag} value '{v}'"))
}

fn report_percentiles(runs: &[RunMetrics]) {
    type Getter = fn(&RunMetrics) -> Duration;
    type Field = (&'static str, Getter);

    fn collect(runs: &[RunMetrics], f: Getter) -> Vec<Duration> {
        let mut v = runs.iter().map(f).collect::<Vec<_>>();
        v.sort_by_key(|d| d.as_nanos());
        v
    }

    fn p(v: &[Duration], p: f64) -> Duration {
        if v.is_empty() {
            return Duration::ZERO;
        }
        let n = v.len();
        let rank = (p * (n as f64)).ceil().clamp(1.0, n as f64) as usize;
        v[rank - 1]
    }

    fn fmt_ms(d: Duration) -> String {
        format!("{:.3}ms", d.as_secs_f64() * 1000.0)
    }

    let fields: &[Field] = &[
        ("layout", |m| m.layout),
        ("serialize", |m| m.serialize),
    ];

    for (name, getter) in fields {
        let v = collect(runs, *getter);
        eprintln!(
            "  {name:10} p50={p50:>10}  p90={p90:>10}  p99={p99:>10}",
            name = *name,
            p50 = fmt_ms(p(&v, 0.50)),
            p90 = fmt_ms(p(&v, 0.90)),
            p99 = fmt_ms(p(&v, 0.99))
        );
    }
}

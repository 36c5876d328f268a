//! PO Translator 命令行入口
//!
//! 子命令覆盖完整流程: merge 合并多个 PO 文件, translate 批量
//! 翻译缺失条目, compile 生成 MO 二进制, stats 查看缓存状态。

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info, warn};

use po_translator::catalog::po;
use po_translator::config::{AppConfig, DEFAULT_CONFIG_PATH};
use po_translator::error::{TranslationError, TranslationResult};
use po_translator::language::{Classifier, StatusAnalyzer, StopwordModel};
use po_translator::merge::Merger;
use po_translator::orchestrator::{FixedPolicy, MismatchPolicy, Orchestrator};
use po_translator::translator::{TranslationCache, Translator};

#[derive(Parser)]
#[command(name = "po-translator")]
#[command(about = "合并 gettext 目录并用大模型批量翻译", version)]
struct Cli {
    /// 配置文件路径
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 合并多个 PO 文件并去重
    Merge {
        /// 输入 PO 文件
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// 输出文件
        #[arg(short, long)]
        output: PathBuf,
    },
    /// 翻译目录里缺失或语言不符的条目
    Translate {
        /// 输入 PO 文件（多个会先合并）
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// 输出文件，省略时覆盖第一个输入
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// 源语言（覆盖配置）
        #[arg(long)]
        source: Option<String>,
        /// 目标语言（覆盖配置）
        #[arg(long)]
        target: Option<String>,
        /// API 密钥（覆盖配置）
        #[arg(long)]
        api_key: Option<String>,
        /// 并发工作者数
        #[arg(long)]
        workers: Option<usize>,
        /// 语言不符条目的处置
        #[arg(long, value_enum, default_value_t = MismatchArg::Keep)]
        mismatch: MismatchArg,
    },
    /// 把 PO 文件编译成 MO 二进制
    Compile {
        input: PathBuf,
        /// 输出文件，默认同名 .mo
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// 显示翻译缓存统计
    Stats,
    /// 清空翻译缓存
    ClearCache,
    /// 写出默认配置文件
    InitConfig,
}

#[derive(Clone, Copy, ValueEnum)]
enum MismatchArg {
    /// 重译规范化到目标语言
    Normalize,
    /// 保留现状
    Keep,
    /// 发现不符即放弃批次
    Cancel,
}

impl From<MismatchArg> for MismatchPolicy {
    fn from(arg: MismatchArg) -> Self {
        match arg {
            MismatchArg::Normalize => MismatchPolicy::Normalize,
            MismatchArg::Keep => MismatchPolicy::Keep,
            MismatchArg::Cancel => MismatchPolicy::Cancel,
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> TranslationResult<()> {
    let config = AppConfig::load(&cli.config)?;

    match cli.command {
        Command::Merge { inputs, output } => {
            let mut merger = Merger::new();
            let report = merger.merge_sources(&inputs);
            info!(
                "合并完成: 载入 {} 条, 去重后 {} 条, 合并重复 {} 条, 失败文件 {}",
                report.total_loaded,
                report.unique_entries,
                report.duplicates_merged,
                report.failed_files
            );
            merger.export_to(&output, None)?;
            println!(
                "{} 条唯一条目已写入 {}",
                report.unique_entries,
                output.display()
            );
            Ok(())
        }
        Command::Translate {
            inputs,
            output,
            source,
            target,
            api_key,
            workers,
            mismatch,
        } => {
            let output = output.unwrap_or_else(|| inputs[0].clone());
            run_translate(config, inputs, output, source, target, api_key, workers, mismatch)
        }
        Command::Compile { input, output } => {
            let mo_path = output.unwrap_or_else(|| input.with_extension("mo"));
            po::compile_mo(&input, &mo_path)?;
            println!("已编译: {}", mo_path.display());
            Ok(())
        }
        Command::Stats => {
            let cache = TranslationCache::open(config.cache_path())?;
            let stats = cache.stats();
            println!("缓存条目: {}", stats.entries);
            println!("缓存文件: {}", config.cache_path().display());
            Ok(())
        }
        Command::ClearCache => {
            let cache = TranslationCache::open(config.cache_path())?;
            let count = cache.len();
            cache.clear()?;
            println!("已清空 {} 条缓存", count);
            Ok(())
        }
        Command::InitConfig => {
            config.save(&cli.config)?;
            println!("配置已写入 {}", shellexpand::tilde(&cli.config));
            Ok(())
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_translate(
    mut config: AppConfig,
    inputs: Vec<PathBuf>,
    output: PathBuf,
    source: Option<String>,
    target: Option<String>,
    api_key: Option<String>,
    workers: Option<usize>,
    mismatch: MismatchArg,
) -> TranslationResult<()> {
    if let Some(source) = source {
        config.source_lang = source;
    }
    if let Some(target) = target {
        config.target_lang = target;
    }
    if let Some(api_key) = api_key {
        config.api_key = api_key;
    }
    if let Some(workers) = workers {
        config.workers = workers;
    }

    let mut merger = Merger::new();
    let report = merger.merge_sources(&inputs);
    if report.failed_files == inputs.len() {
        return Err(TranslationError::Config(
            "所有输入文件都无法读取".to_string(),
        ));
    }
    info!("载入 {} 条唯一条目", report.unique_entries);

    let backend = build_backend(&config)?;
    let cache = Arc::new(TranslationCache::open(config.cache_path())?);
    let translator = Arc::new(Translator::new(backend, cache));
    translator.configure_languages(&config.source_lang, &config.target_lang);
    translator.set_auto_detect(config.auto_detect);

    let analyzer = Arc::new(StatusAnalyzer::new(Arc::new(Classifier::new(Arc::new(
        StopwordModel::new(),
    )))));
    let orchestrator =
        Orchestrator::new(translator.clone(), analyzer).with_workers(config.workers);

    let entries = merger.entries_list();
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| TranslationError::Internal(format!("无法创建运行时: {}", e)))?;
    let batch = runtime.block_on(orchestrator.run(
        &entries,
        Some(merger.provenance()),
        &FixedPolicy(mismatch.into()),
        |done, total| {
            if done % 25 == 0 || done == total {
                info!("进度: {}/{}", done, total);
            }
        },
    ))?;

    if batch.cancelled {
        warn!("批次已取消, 不写出文件");
        return Ok(());
    }
    merger.export_to(&output, None)?;

    let stats = translator.get_stats();
    println!("已译 {} 条, 跳过 {} 条, 失败 {} 条", batch.translated, batch.skipped, batch.failed);
    println!(
        "API 调用 {} 次, 缓存命中率 {:.0}%",
        stats.api_calls,
        stats.hit_rate() * 100.0
    );
    println!("结果已写入 {}", output.display());
    Ok(())
}

#[cfg(feature = "gemini")]
fn build_backend(
    config: &AppConfig,
) -> TranslationResult<Arc<dyn po_translator::translator::TranslationBackend>> {
    if !config.has_api_key() {
        return Err(TranslationError::Config(
            "缺少 API 密钥, 用 --api-key 或配置文件提供".to_string(),
        ));
    }
    Ok(Arc::new(
        po_translator::translator::GeminiBackend::new(config.api_key.clone())
            .with_model(config.model.clone()),
    ))
}

#[cfg(not(feature = "gemini"))]
fn build_backend(
    _config: &AppConfig,
) -> TranslationResult<Arc<dyn po_translator::translator::TranslationBackend>> {
    Err(TranslationError::Config(
        "编译时未启用 gemini 特性, 没有可用的翻译后端".to_string(),
    ))
}

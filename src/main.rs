use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

use drag_shake::config::Config;
use drag_shake::services::{LoggingShelf, Orchestrator};
use drag_shake::utils;

#[derive(Parser, Debug)]
#[command(name = "drag-shake")]
#[command(about = "Полка файлов по встряхиванию курсора во время перетаскивания")]
struct Args {
    /// Путь к файлу конфигурации
    #[arg(short, long, default_value = "drag-shake.toml")]
    config: String,

    /// Режим сухого запуска (сценарий вместо устройств ввода)
    #[arg(long)]
    dry_run: bool,

    /// Уровень логирования (перекрывает конфигурацию)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Загрузка конфигурации
    let config = Arc::new(Config::load(&args.config)?);

    // Инициализация системы логирования
    let level = args.log_level.as_deref().unwrap_or(&config.logging.level);
    init_tracing(level, &config.logging.format)?;

    info!("Запуск drag-shake v{}", env!("CARGO_PKG_VERSION"));
    info!("Конфигурация загружена из: {}", args.config);

    if args.dry_run {
        warn!("Режим сухого запуска - устройства ввода не используются");
    } else if let Err(e) = utils::permissions::check_permissions() {
        // Без прав функция работает в деградированном режиме, приложение не падает
        warn!("Проверка прав доступа не пройдена: {}", e);
    }

    let shake = config.shake.resolve();
    info!(
        "Жест: {:?}, разворотов {}, окно {}ms, путь {}px",
        config.shake.preset, shake.min_direction_changes, shake.time_window_ms, shake.min_distance_px
    );

    let (orchestrator, handle) = Orchestrator::new(config.clone(), Arc::new(LoggingShelf), args.dry_run)?;
    info!("Все компоненты инициализированы");

    let orchestrator_handle = tokio::spawn(async move {
        if let Err(e) = orchestrator.run().await {
            error!("Ошибка в Orchestrator: {}", e);
        }
    });

    info!("Конвейер drag+shake запущен");

    // Ожидание сигнала завершения
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Получен сигнал завершения (Ctrl+C)");
        }
        Err(err) => {
            error!("Ошибка при ожидании сигнала завершения: {}", err);
        }
    }

    info!("Завершение работы...");

    match handle.metrics().await {
        Ok(metrics) => info!(
            "Итог: событий {}, пакетов {}, потеряно {}, встряхиваний {}, полок {}, подавлено {}",
            metrics.events_processed,
            metrics.batches_delivered,
            metrics.events_dropped,
            metrics.shakes_detected,
            metrics.triggers_fired,
            metrics.triggers_suppressed
        ),
        Err(e) => warn!("Метрики недоступны: {}", e),
    }

    if let Err(e) = handle.shutdown().await {
        warn!("Не удалось отправить команду остановки: {}", e);
    }

    // Ожидаем завершения (с таймаутом)
    let shutdown_timeout = tokio::time::Duration::from_secs(5);
    match tokio::time::timeout(shutdown_timeout, orchestrator_handle).await {
        Ok(_) => info!("Все сервисы завершили работу корректно"),
        Err(_) => warn!("Таймаут при завершении сервисов"),
    }

    info!("drag-shake завершил работу");
    Ok(())
}

fn init_tracing(level: &str, format: &str) -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))?;

    let registry = tracing_subscriber::registry().with(filter);
    if format == "compact" {
        registry.with(tracing_subscriber::fmt::layer().compact()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().pretty()).init();
    }

    Ok(())
}

use crate::error::CaptureError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

use super::hook::HookContext;

/// Выделенный поток захвата. Контекст колбэка хранится снаружи потока
/// и переживает остановку и перезапуск.
pub struct CaptureThread {
    name: &'static str,
    context: Arc<Mutex<HookContext>>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl CaptureThread {
    pub fn new(name: &'static str, context: HookContext) -> Self {
        Self {
            name,
            context: Arc::new(Mutex::new(context)),
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Запустить тело потока. Тело крутится, пока `running` истинно.
    pub fn spawn<F>(&mut self, body: F) -> Result<(), CaptureError>
    where
        F: FnOnce(&mut HookContext, &AtomicBool) + Send + 'static,
    {
        if self.is_running() {
            debug!("Поток {} уже запущен", self.name);
            return Ok(());
        }
        // Завершившийся сам по себе поток ещё не подобран
        self.reap();

        let context = self.context.clone();
        let running = self.running.clone();
        running.store(true, Ordering::Release);

        let spawned = thread::Builder::new()
            .name(self.name.to_string())
            .spawn(move || {
                {
                    let mut ctx = context.lock();
                    body(&mut ctx, &running);
                }
                running.store(false, Ordering::Release);
            });

        match spawned {
            Ok(handle) => {
                info!("Поток захвата {} запущен", self.name);
                self.handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::Release);
                Err(CaptureError::HookInstallFailed(format!(
                    "не удалось создать поток {}: {}",
                    self.name, e
                )))
            }
        }
    }

    /// Идемпотентная остановка. Из самого потока захвата не ждёт себя.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);

        let Some(handle) = self.handle.take() else {
            return;
        };

        if handle.thread().id() == thread::current().id() {
            debug!("Остановка {} вызвана из самого потока захвата, ожидание пропущено", self.name);
            return;
        }

        if handle.join().is_err() {
            warn!("Поток захвата {} завершился паникой", self.name);
        } else {
            info!("Поток захвата {} остановлен", self.name);
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
            && self.handle.as_ref().map_or(false, |h| !h.is_finished())
    }

    pub fn context(&self) -> Arc<Mutex<HookContext>> {
        self.context.clone()
    }

    fn reap(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                self.handle = Some(handle);
            }
        }
    }
}

impl Drop for CaptureThread {
    fn drop(&mut self) {
        self.stop();
    }
}

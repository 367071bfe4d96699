use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Mutex, PoisonError};

use log::{info, warn};
use serde::Serialize;
use utoipa::ToSchema;

use crate::analysis::Stage;
use crate::error::{Result, StoreError};

/// 单个阶段的模型加载状态
///
/// `Unloaded -> Loading -> {Ready, Failed}`，`Ready` 和 `Failed` 均为终态
#[derive(Serialize, ToSchema, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum StageState {
    Unloaded = 0,
    Loading = 1,
    Ready = 2,
    Failed = 3,
}

impl StageState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Unloaded,
            1 => Self::Loading,
            2 => Self::Ready,
            _ => Self::Failed,
        }
    }

    pub fn is_resolved(self) -> bool {
        matches!(self, Self::Ready | Self::Failed)
    }
}

/// 模型就绪状态的快照
#[derive(Serialize, Debug, Clone)]
pub struct Readiness {
    pub initialized: bool,
    pub detection: StageState,
    pub caption: StageState,
    pub embedding: StageState,
    pub errors: Vec<String>,
}

/// 记录每个分析阶段是否可用
///
/// 三个阶段全部加载结束（无论成功与否）后，`initialized` 会且仅会从 false 变为 true 一次
pub struct ReadinessGate {
    states: [AtomicU8; 3],
    initialized: AtomicBool,
    errors: Mutex<Vec<String>>,
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessGate {
    pub fn new() -> Self {
        Self {
            states: [
                AtomicU8::new(StageState::Unloaded as u8),
                AtomicU8::new(StageState::Unloaded as u8),
                AtomicU8::new(StageState::Unloaded as u8),
            ],
            initialized: AtomicBool::new(false),
            errors: Mutex::new(vec![]),
        }
    }

    pub fn state(&self, stage: Stage) -> StageState {
        StageState::from_u8(self.states[stage.index()].load(Ordering::SeqCst))
    }

    pub fn is_ready(&self, stage: Stage) -> bool {
        self.state(stage) == StageState::Ready
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// 未初始化时返回 `NotReady`
    pub fn require_initialized(&self) -> Result<()> {
        if self.is_initialized() {
            return Ok(());
        }
        let mut message = String::from("Models are still initializing");
        let errors = self.errors();
        if !errors.is_empty() {
            message.push_str(&format!(". Initialization errors: {}", errors.join(", ")));
        }
        Err(StoreError::NotReady(message))
    }

    /// 标记某个阶段开始加载，只有处于 `Unloaded` 状态时才会成功
    pub fn begin_loading(&self, stage: Stage) -> bool {
        self.transition(stage, StageState::Unloaded, StageState::Loading)
    }

    pub fn mark_ready(&self, stage: Stage) -> bool {
        let ok = self.transition(stage, StageState::Loading, StageState::Ready);
        if ok {
            self.try_finish();
        }
        ok
    }

    /// 将阶段标记为永久失败，未开始加载的阶段也可以直接失败
    pub fn mark_failed(&self, stage: Stage, message: impl Into<String>) -> bool {
        let message = message.into();
        let ok = (self.state(stage) == StageState::Unloaded
            && self.transition(stage, StageState::Unloaded, StageState::Failed))
            || self.transition(stage, StageState::Loading, StageState::Failed);
        if ok {
            self.errors.lock().unwrap_or_else(PoisonError::into_inner).push(message);
            self.try_finish();
        }
        ok
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn snapshot(&self) -> Readiness {
        Readiness {
            initialized: self.is_initialized(),
            detection: self.state(Stage::Detection),
            caption: self.state(Stage::Caption),
            embedding: self.state(Stage::Embedding),
            errors: self.errors(),
        }
    }

    fn transition(&self, stage: Stage, from: StageState, to: StageState) -> bool {
        let result = self.states[stage.index()].compare_exchange(
            from as u8,
            to as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        if let Err(current) = result {
            warn!(
                "{} 模型状态无法从 {:?} 切换到 {:?}，当前状态 {:?}",
                stage,
                from,
                to,
                StageState::from_u8(current)
            );
        }
        result.is_ok()
    }

    fn try_finish(&self) {
        if !Stage::ALL.iter().all(|&stage| self.state(stage).is_resolved()) {
            return;
        }
        if self.initialized.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_ok()
        {
            info!("模型初始化完成，可用阶段: {:?}", self.ready_stages());
        }
    }

    fn ready_stages(&self) -> Vec<Stage> {
        Stage::ALL.into_iter().filter(|&stage| self.is_ready(stage)).collect()
    }
}

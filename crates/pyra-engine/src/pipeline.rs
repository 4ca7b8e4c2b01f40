//! Render pipeline
//!
//! Owns one instance of every generator and effect plus the frame buffer
//! and the safety monitor; holds a selector for the active generator and
//! effect. Each `render` runs generator -> effect -> mapper -> strip.
//! Switching resets the newcomer and is instantaneous (no crossfade).

use pyra_core::{AudioControl, DeviceConfig, LedMapper, PixelMatrix, PyraError, PyraResult};
use pyra_hal::LedStrip;

use crate::{
    blit, EffectKind, Fire, FireParams, HueRotationEffect, Lightning, LightningParams, NoOpEffect,
    Water, WaterParams, WhiteoutMonitor, DEFAULT_WHITEOUT_FRAME_LIMIT,
};

/// Generator selector. The active generator is dispatched by `match`;
/// inactive generators keep their (reset) state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorKind {
    #[default]
    Fire,
    Water,
    Lightning,
}

pub struct RenderPipeline {
    matrix: PixelMatrix,

    fire: Fire,
    water: Water,
    lightning: Lightning,
    generator: GeneratorKind,

    noop: NoOpEffect,
    hue_rotation: HueRotationEffect,
    effect: EffectKind,

    monitor: WhiteoutMonitor,
    halted: bool,
}

impl RenderPipeline {
    pub fn new(config: &DeviceConfig) -> PyraResult<Self> {
        let mut validated = config.clone();
        validated.validate()?;

        Ok(Self {
            matrix: PixelMatrix::new(validated.width, validated.height),
            fire: Fire::new(&validated, FireParams::default()),
            water: Water::new(&validated, WaterParams::default()),
            lightning: Lightning::new(&validated, LightningParams::default()),
            generator: GeneratorKind::Fire,
            noop: NoOpEffect,
            hue_rotation: HueRotationEffect::default(),
            effect: EffectKind::None,
            monitor: WhiteoutMonitor::new(DEFAULT_WHITEOUT_FRAME_LIMIT),
            halted: false,
        })
    }

    /// Render one frame. The only error is the safety halt; once halted the
    /// pipeline refuses every subsequent frame.
    pub fn render<S: LedStrip>(
        &mut self,
        audio: &AudioControl,
        dt: f32,
        mapper: &LedMapper,
        strip: &mut S,
    ) -> PyraResult<()> {
        if self.halted {
            return Err(PyraError::SafetyHalt);
        }

        match self.generator {
            GeneratorKind::Fire => self.fire.generate(&mut self.matrix, audio, dt),
            GeneratorKind::Water => self.water.generate(&mut self.matrix, audio, dt),
            GeneratorKind::Lightning => self.lightning.generate(&mut self.matrix, audio, dt),
        }

        match self.effect {
            EffectKind::None => self.noop.apply(&mut self.matrix, dt),
            EffectKind::HueRotation => self.hue_rotation.apply(&mut self.matrix, dt),
        }

        if self.monitor.observe(&self.matrix) {
            self.halted = true;
            return Err(PyraError::SafetyHalt);
        }

        blit(&self.matrix, mapper, strip);
        Ok(())
    }

    /// Switch the active generator; the newcomer starts from a clean state.
    pub fn set_generator(&mut self, kind: GeneratorKind) {
        if kind == self.generator {
            return;
        }
        match kind {
            GeneratorKind::Fire => self.fire.reset(),
            GeneratorKind::Water => self.water.reset(),
            GeneratorKind::Lightning => self.lightning.reset(),
        }
        log::info!("pipeline: generator -> {kind:?}");
        self.generator = kind;
    }

    pub fn set_effect(&mut self, kind: EffectKind) {
        if kind == self.effect {
            return;
        }
        match kind {
            EffectKind::None => self.noop.reset(),
            EffectKind::HueRotation => self.hue_rotation.reset(),
        }
        log::info!("pipeline: effect -> {kind:?}");
        self.effect = kind;
    }

    #[inline]
    pub fn generator(&self) -> GeneratorKind {
        self.generator
    }

    #[inline]
    pub fn effect(&self) -> EffectKind {
        self.effect
    }

    #[inline]
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// The frame produced by the last `render`.
    #[inline]
    pub fn matrix(&self) -> &PixelMatrix {
        &self.matrix
    }

    pub fn active_particle_count(&self) -> usize {
        match self.generator {
            GeneratorKind::Fire => self.fire.active_count(),
            GeneratorKind::Water => self.water.active_count(),
            GeneratorKind::Lightning => self.lightning.active_count(),
        }
    }

    // Parameter access for the host's configuration layer

    pub fn fire_mut(&mut self) -> &mut Fire {
        &mut self.fire
    }

    pub fn water_mut(&mut self) -> &mut Water {
        &mut self.water
    }

    pub fn lightning_mut(&mut self) -> &mut Lightning {
        &mut self.lightning
    }

    pub fn hue_rotation_mut(&mut self) -> &mut HueRotationEffect {
        &mut self.hue_rotation
    }
}

//! C shim between Rust and libsimavr.
//!
//! simavr exposes its cycle counter and configuration as fields of `avr_t`,
//! whose layout depends on the installed version. Instead of mirroring the
//! struct, a few lines of C are compiled against the installed headers and
//! the result is loaded as a shared library.

use std::path::{Path, PathBuf};
use std::process::Command;

use libloading::os::unix::{Library, RTLD_NOW};
use tempfile::TempDir;
use tracing::debug;

use super::api::ShimApi;
use crate::SimError;

const SHIM_SOURCE: &str = r#"
#include <stdint.h>
#include <stdlib.h>

#include <simavr/sim_avr.h>
#include <simavr/sim_io.h>
#include <simavr/sim_irq.h>
#include <simavr/avr_ioport.h>
#include <simavr/avr_eeprom.h>

typedef void (*avrbench_pin_cb)(void *ctx, uint32_t value, uint64_t cycle);

typedef struct avrbench_sub {
    avr_t *avr;
    avrbench_pin_cb cb;
    void *ctx;
    struct avrbench_sub *next;
} avrbench_sub;

typedef struct avrbench_shim {
    avr_t *avr;
    avrbench_sub *subs;
} avrbench_shim;

static void avrbench_notify(struct avr_irq_t *irq, uint32_t value, void *param) {
    (void)irq;
    avrbench_sub *sub = param;
    sub->cb(sub->ctx, value, sub->avr->cycle);
}

static void avrbench_release(avr_t *avr) {
    avr_terminate(avr);
    free(avr);
}

void *avrbench_shim_open(const char *mcu, uint32_t frequency,
                         const uint8_t *flash, uint32_t flash_len, uint32_t code_end,
                         const uint8_t *eeprom, uint32_t eeprom_len,
                         uint8_t log_level, int32_t *status, uint32_t *capacity) {
    *capacity = 0;
    avr_t *avr = avr_make_mcu_by_name(mcu);
    if (!avr) {
        *status = -1;
        return NULL;
    }
    if (avr_init(avr) != 0) {
        free(avr->flash);
        free(avr->data);
        free(avr);
        *status = -2;
        return NULL;
    }
    avr->log = log_level;
    avr->frequency = frequency;

    /* avr_loadcode aborts the process on oversized images. */
    uint32_t flash_capacity = (uint32_t)avr->flashend + 1;
    if (flash_len > flash_capacity) {
        *capacity = flash_capacity;
        avrbench_release(avr);
        *status = -3;
        return NULL;
    }
    avr_loadcode(avr, (uint8_t *)flash, flash_len, 0);
    avr->codeend = code_end;
    if (eeprom_len > 0) {
        avr_eeprom_desc_t desc = { .ee = (uint8_t *)eeprom, .offset = 0, .size = eeprom_len };
        if (avr_ioctl(avr, AVR_IOCTL_EEPROM_SET, &desc) != 0) {
            avrbench_release(avr);
            *status = -4;
            return NULL;
        }
    }

    avrbench_shim *shim = calloc(1, sizeof(*shim));
    if (!shim) {
        avrbench_release(avr);
        *status = -2;
        return NULL;
    }
    shim->avr = avr;
    *status = 0;
    return shim;
}

int avrbench_shim_run(void *handle, uint32_t steps) {
    avrbench_shim *shim = handle;
    for (uint32_t i = 0; i < steps; i++) {
        int state = avr_run(shim->avr);
        if (state == cpu_Done)
            return 1;
        if (state == cpu_Crashed)
            return 2;
    }
    return 0;
}

uint64_t avrbench_shim_cycle(void *handle) {
    avrbench_shim *shim = handle;
    return shim->avr->cycle;
}

int avrbench_shim_subscribe(void *handle, char port, uint8_t bit,
                            avrbench_pin_cb cb, void *ctx) {
    avrbench_shim *shim = handle;
    avr_irq_t *irq = avr_io_getirq(shim->avr, AVR_IOCTL_IOPORT_GETIRQ(port), bit);
    if (!irq)
        return -1;
    avrbench_sub *sub = calloc(1, sizeof(*sub));
    if (!sub)
        return -2;
    sub->avr = shim->avr;
    sub->cb = cb;
    sub->ctx = ctx;
    sub->next = shim->subs;
    shim->subs = sub;
    avr_irq_register_notify(irq, avrbench_notify, sub);
    return 0;
}

void avrbench_shim_close(void *handle) {
    avrbench_shim *shim = handle;
    avrbench_release(shim->avr);
    while (shim->subs) {
        avrbench_sub *next = shim->subs->next;
        free(shim->subs);
        shim->subs = next;
    }
    free(shim);
}
"#;

const SHIM_FILE: &str = "avrbench_shim.c";
const SHIM_LIBRARY: &str = "libavrbench_shim.so";

/// How to compile the shim.
#[derive(Clone, Debug)]
pub struct ShimBuildConfig {
    /// C compiler command (e.g. `cc`, `clang`, `gcc-13`).
    pub compiler: String,
    /// Extra header search paths; the parent of `simavr/` must be reachable.
    pub include_dirs: Vec<PathBuf>,
    /// Extra library search paths, also added as rpath.
    pub lib_dirs: Vec<PathBuf>,
    /// Libraries to link, without the `lib` prefix.
    pub libs: Vec<String>,
}

impl Default for ShimBuildConfig {
    fn default() -> Self {
        Self {
            compiler: "cc".to_string(),
            include_dirs: Vec::new(),
            lib_dirs: Vec::new(),
            libs: vec!["simavr".to_string()],
        }
    }
}

impl ShimBuildConfig {
    fn command(&self, source: &Path, output: &Path) -> Command {
        let mut cmd = Command::new(&self.compiler);
        cmd.args(["-shared", "-fPIC", "-O2", "-o"])
            .arg(output)
            .arg(source);
        for dir in &self.include_dirs {
            cmd.arg(format!("-I{}", dir.display()));
        }
        for dir in &self.lib_dirs {
            cmd.arg(format!("-L{}", dir.display()));
            cmd.arg(format!("-Wl,-rpath,{}", dir.display()));
        }
        for lib in &self.libs {
            cmd.arg(format!("-l{lib}"));
        }
        cmd
    }
}

/// The compiled and loaded shim. Share one between several MCUs with `Rc`.
pub struct ShimLibrary {
    pub(super) api: ShimApi,
    _lib: Library,
    _dir: TempDir,
}

impl ShimLibrary {
    /// Compile the shim into a scratch directory and load it.
    pub fn build(config: &ShimBuildConfig) -> Result<Self, SimError> {
        let dir = tempfile::Builder::new().prefix("avrbench-shim-").tempdir()?;
        let source = dir.path().join(SHIM_FILE);
        let output = dir.path().join(SHIM_LIBRARY);
        std::fs::write(&source, SHIM_SOURCE)?;

        let mut cmd = config.command(&source, &output);
        debug!(command = ?cmd, "compiling simavr shim");
        let result = cmd.output().map_err(|e| {
            SimError::ShimBuild(format!("failed to run {}: {e}", config.compiler))
        })?;
        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(SimError::ShimBuild(stderr.trim().to_string()));
        }

        Self::open(&output, dir)
    }

    fn open(path: &Path, dir: TempDir) -> Result<Self, SimError> {
        debug!(path = %path.display(), "loading simavr shim");
        let lib = unsafe { Library::open(Some(path), RTLD_NOW)? };
        let api = unsafe { ShimApi::load(&lib)? };
        Ok(Self {
            api,
            _lib: lib,
            _dir: dir,
        })
    }
}

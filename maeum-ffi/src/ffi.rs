use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_double, c_int};
use std::path::Path;

use maeum::{AppConfig, Chatbot, RegistryConfig};
use tracing::error;

/// Opaque handle owned by the caller.
pub struct MaeumEngine {
    bot: Chatbot,
}

impl MaeumEngine {
    pub fn bot(&self) -> &Chatbot {
        &self.bot
    }
}

fn engine_from_config(config: AppConfig) -> *mut MaeumEngine {
    match Chatbot::new(config) {
        Ok(bot) => Box::into_raw(Box::new(MaeumEngine { bot })),
        Err(e) => {
            error!(error = %e, "failed to create engine");
            std::ptr::null_mut()
        }
    }
}

/// Borrow a C string as UTF-8, or `None` for null or invalid input.
unsafe fn str_arg<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok()
}

/// Create an engine from a JSON config file; null uses the defaults.
#[no_mangle]
pub extern "C" fn maeum_engine_new(config_path: *const c_char) -> *mut MaeumEngine {
    if config_path.is_null() {
        return engine_from_config(AppConfig::default());
    }
    let Some(path) = (unsafe { str_arg(config_path) }) else {
        error!("config path is not valid UTF-8");
        return std::ptr::null_mut();
    };
    let path = Path::new(path);
    match AppConfig::load(path) {
        Ok(config) => engine_from_config(config),
        Err(e) => {
            error!(path = %path.display(), error = %e, "failed to read config");
            std::ptr::null_mut()
        }
    }
}

/// Create an engine with the default file layout under `model_dir`.
#[no_mangle]
pub extern "C" fn maeum_engine_new_in_dir(model_dir: *const c_char) -> *mut MaeumEngine {
    let Some(dir) = (unsafe { str_arg(model_dir) }) else {
        return std::ptr::null_mut();
    };
    engine_from_config(AppConfig {
        models: RegistryConfig::in_dir(dir),
        ..AppConfig::default()
    })
}

/// Load the named model and make it active. Returns 0 on success, -1 on
/// failure, in which case the previous model stays active.
#[no_mangle]
pub extern "C" fn maeum_select_model(engine: *mut MaeumEngine, name: *const c_char) -> c_int {
    if engine.is_null() {
        return -1;
    }
    let engine = unsafe { &*engine };
    let Some(name) = (unsafe { str_arg(name) }) else {
        return -1;
    };
    match engine.bot.select_model(name) {
        Ok(_) => 0,
        Err(e) => {
            error!(model = name, error = %e, "select_model failed");
            -1
        }
    }
}

/// Reply to `text`. Returns a string to release with [`maeum_string_free`],
/// or null on error.
#[no_mangle]
pub extern "C" fn maeum_generate_response(
    engine: *mut MaeumEngine,
    text: *const c_char,
    temperature: c_double,
) -> *mut c_char {
    if engine.is_null() {
        return std::ptr::null_mut();
    }
    let engine = unsafe { &*engine };
    let Some(text) = (unsafe { str_arg(text) }) else {
        return std::ptr::null_mut();
    };
    let reply = match engine.bot.generate_response(text, temperature) {
        Ok(reply) => reply,
        Err(e) => {
            error!(error = %e, "generate_response failed");
            return std::ptr::null_mut();
        }
    };
    match CString::new(reply) {
        Ok(s) => s.into_raw(),
        Err(_) => std::ptr::null_mut(),
    }
}

#[no_mangle]
pub extern "C" fn maeum_string_free(ptr: *mut c_char) {
    if !ptr.is_null() {
        unsafe {
            drop(CString::from_raw(ptr));
        }
    }
}

#[no_mangle]
pub extern "C" fn maeum_engine_free(engine: *mut MaeumEngine) {
    if !engine.is_null() {
        unsafe {
            drop(Box::from_raw(engine));
        }
    }
}

//! LabJack LJM driver bindings.
//!
//! The vendor library is loaded at runtime so the crate builds on machines
//! without it; a missing library surfaces as `DeviceUnavailable` when a
//! session tries to open the device.

use libloading::Library;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_double, c_int};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::device::{DeviceOpener, DeviceReader, DeviceSelector};
use crate::error::AcqError;
use crate::sample::Channel;

#[cfg(target_os = "windows")]
const LIBRARY_NAMES: &[&str] = &["LabJackM.dll"];
#[cfg(target_os = "macos")]
const LIBRARY_NAMES: &[&str] = &["libLabJackM.dylib", "/usr/local/lib/libLabJackM.dylib"];
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const LIBRARY_NAMES: &[&str] = &["libLabJackM.so", "/usr/local/lib/libLabJackM.so"];

const LJME_NOERROR: c_int = 0;
const LJME_WARNINGS_BEGIN: c_int = 200;
const LJME_WARNINGS_END: c_int = 399;
const LJM_MAX_NAME_SIZE: usize = 256;
const LJM_LIST_ALL_SIZE: usize = 128;

type FnOpenS = unsafe extern "C" fn(*const c_char, *const c_char, *const c_char, *mut c_int) -> c_int;
type FnClose = unsafe extern "C" fn(c_int) -> c_int;
type FnReadName = unsafe extern "C" fn(c_int, *const c_char, *mut c_double) -> c_int;
type FnHandleInfo = unsafe extern "C" fn(
    c_int,
    *mut c_int,
    *mut c_int,
    *mut c_int,
    *mut c_int,
    *mut c_int,
    *mut c_int,
) -> c_int;
type FnErrorToString = unsafe extern "C" fn(c_int, *mut c_char);
type FnListAllS = unsafe extern "C" fn(
    *const c_char,
    *const c_char,
    *mut c_int,
    *mut c_int,
    *mut c_int,
    *mut c_int,
    *mut c_int,
) -> c_int;

struct LjmApi {
    #[allow(dead_code)]
    lib: Library,
    open_s: FnOpenS,
    close: FnClose,
    read_name: FnReadName,
    handle_info: FnHandleInfo,
    error_to_string: FnErrorToString,
    list_all_s: FnListAllS,
}

impl LjmApi {
    fn load() -> Result<Self, AcqError> {
        let mut last_err = None;
        for name in LIBRARY_NAMES {
            // Safety: loading the vendor library runs its initialisers, which
            // only set up driver state.
            match unsafe { Library::new(name) } {
                Ok(lib) => return Self::bind(lib),
                Err(e) => last_err = Some(format!("{name}: {e}")),
            }
        }
        Err(AcqError::DeviceUnavailable(format!(
            "LJM library not found ({})",
            last_err.unwrap_or_default()
        )))
    }

    fn bind(lib: Library) -> Result<Self, AcqError> {
        let missing = |e: libloading::Error| AcqError::DeviceUnavailable(format!("LJM symbol missing: {e}"));
        // Safety: signatures follow LabJackM.h.
        let (open_s, close, read_name, handle_info, error_to_string, list_all_s) = unsafe {
            let open_s = *lib.get::<FnOpenS>(b"LJM_OpenS\0").map_err(missing)?;
            let close = *lib.get::<FnClose>(b"LJM_Close\0").map_err(missing)?;
            let read_name = *lib.get::<FnReadName>(b"LJM_eReadName\0").map_err(missing)?;
            let handle_info = *lib.get::<FnHandleInfo>(b"LJM_GetHandleInfo\0").map_err(missing)?;
            let error_to_string = *lib.get::<FnErrorToString>(b"LJM_ErrorToString\0").map_err(missing)?;
            let list_all_s = *lib.get::<FnListAllS>(b"LJM_ListAllS\0").map_err(missing)?;
            (open_s, close, read_name, handle_info, error_to_string, list_all_s)
        };
        Ok(Self {
            lib,
            open_s,
            close,
            read_name,
            handle_info,
            error_to_string,
            list_all_s,
        })
    }

    fn describe_error(&self, code: c_int) -> String {
        let mut buf = [0 as c_char; LJM_MAX_NAME_SIZE];
        // Safety: the buffer is LJM_MAX_NAME_SIZE bytes as the API requires.
        unsafe { (self.error_to_string)(code, buf.as_mut_ptr()) };
        let text = unsafe { CStr::from_ptr(buf.as_ptr()) }.to_string_lossy().into_owned();
        format!("{text} (LJM error {code})")
    }

    /// `Ok` for success and warnings, `Err(description)` otherwise.
    fn check(&self, code: c_int, what: &str) -> Result<(), String> {
        match code {
            LJME_NOERROR => Ok(()),
            LJME_WARNINGS_BEGIN..=LJME_WARNINGS_END => {
                warn!("{what}: {}", self.describe_error(code));
                Ok(())
            }
            _ => Err(self.describe_error(code)),
        }
    }
}

fn c_string(value: &str) -> Result<CString, AcqError> {
    CString::new(value).map_err(|_| AcqError::Configuration(format!("{value:?} contains a NUL byte")))
}

/// Identification reported by `LJM_GetHandleInfo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HandleInfo {
    pub device_type: i32,
    pub connection_type: i32,
    pub serial_number: i32,
    pub ip_address: i32,
    pub port: i32,
    pub max_bytes_per_mb: i32,
}

/// One entry of `LJM_ListAllS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListedDevice {
    pub device_type: i32,
    pub connection_type: i32,
    pub serial_number: i32,
    pub ip_address: i32,
}

pub fn device_type_name(code: i32) -> &'static str {
    match code {
        4 => "T4",
        7 => "T7",
        8 => "T8",
        200 => "Digit",
        _ => "unknown",
    }
}

pub fn connection_type_name(code: i32) -> &'static str {
    match code {
        1 => "USB",
        2 => "TCP",
        3 => "Ethernet",
        4 => "WiFi",
        _ => "unknown",
    }
}

/// Opens LabJack devices through the LJM driver, loading it on first use.
#[derive(Default)]
pub struct LjmOpener {
    api: Mutex<Option<Arc<LjmApi>>>,
}

impl LjmOpener {
    pub fn new() -> Self {
        Self::default()
    }

    fn api(&self) -> Result<Arc<LjmApi>, AcqError> {
        let mut guard = self
            .api
            .lock()
            .map_err(|_| AcqError::DeviceUnavailable("LJM loader poisoned".to_string()))?;
        if let Some(api) = guard.as_ref() {
            return Ok(Arc::clone(api));
        }
        let api = Arc::new(LjmApi::load()?);
        info!("LJM driver library loaded");
        *guard = Some(Arc::clone(&api));
        Ok(api)
    }

    /// Enumerate devices matching the selector's type and connection.
    pub fn list(&self, selector: &DeviceSelector) -> Result<Vec<ListedDevice>, AcqError> {
        let api = self.api()?;
        let device_type = c_string(&selector.device_type)?;
        let connection_type = c_string(&selector.connection_type)?;
        let mut found: c_int = 0;
        let mut types = [0 as c_int; LJM_LIST_ALL_SIZE];
        let mut connections = [0 as c_int; LJM_LIST_ALL_SIZE];
        let mut serials = [0 as c_int; LJM_LIST_ALL_SIZE];
        let mut addresses = [0 as c_int; LJM_LIST_ALL_SIZE];
        // Safety: every output array holds LJM_LIST_ALL_SIZE entries.
        let code = unsafe {
            (api.list_all_s)(
                device_type.as_ptr(),
                connection_type.as_ptr(),
                &mut found,
                types.as_mut_ptr(),
                connections.as_mut_ptr(),
                serials.as_mut_ptr(),
                addresses.as_mut_ptr(),
            )
        };
        api.check(code, "LJM_ListAllS").map_err(AcqError::DeviceUnavailable)?;

        let count = (found.max(0) as usize).min(LJM_LIST_ALL_SIZE);
        Ok((0..count)
            .map(|i| ListedDevice {
                device_type: types[i],
                connection_type: connections[i],
                serial_number: serials[i],
                ip_address: addresses[i],
            })
            .collect())
    }
}

impl DeviceOpener for LjmOpener {
    fn open(&self, selector: &DeviceSelector) -> Result<Box<dyn DeviceReader>, AcqError> {
        let api = self.api()?;
        let device_type = c_string(&selector.device_type)?;
        let connection_type = c_string(&selector.connection_type)?;
        let identifier = c_string(&selector.identifier)?;

        info!(%selector, "Opening LabJack device");
        let mut handle: c_int = 0;
        // Safety: all strings are NUL-terminated and outlive the call.
        let code = unsafe {
            (api.open_s)(
                device_type.as_ptr(),
                connection_type.as_ptr(),
                identifier.as_ptr(),
                &mut handle,
            )
        };
        api.check(code, "LJM_OpenS").map_err(AcqError::DeviceUnavailable)?;

        let mut info = HandleInfo::default();
        // Safety: each pointer refers to a distinct live c_int.
        let code = unsafe {
            (api.handle_info)(
                handle,
                &mut info.device_type,
                &mut info.connection_type,
                &mut info.serial_number,
                &mut info.ip_address,
                &mut info.port,
                &mut info.max_bytes_per_mb,
            )
        };
        if let Err(e) = api.check(code, "LJM_GetHandleInfo") {
            warn!("Could not query handle info: {e}");
        }

        let device = LjmDevice {
            api,
            handle,
            info,
            closed: false,
        };
        info!("Connected to {}", device.describe());
        Ok(Box::new(device))
    }
}

/// An open LJM handle. Closed on drop if not closed explicitly.
pub struct LjmDevice {
    api: Arc<LjmApi>,
    handle: c_int,
    info: HandleInfo,
    closed: bool,
}

impl LjmDevice {
    pub fn info(&self) -> HandleInfo {
        self.info
    }
}

impl DeviceReader for LjmDevice {
    fn read_channel(&mut self, channel: Channel) -> Result<f64, AcqError> {
        if self.closed {
            return Err(AcqError::DeviceRead {
                channel,
                reason: "handle already closed".to_string(),
            });
        }
        let name = c_string(&channel.register_name())?;
        let mut value: c_double = 0.0;
        // Safety: `name` is NUL-terminated and `value` is a live c_double.
        let code = unsafe { (self.api.read_name)(self.handle, name.as_ptr(), &mut value) };
        self.api
            .check(code, "LJM_eReadName")
            .map_err(|reason| AcqError::DeviceRead { channel, reason })?;
        debug!(%channel, value, "AIN read");
        Ok(value)
    }

    fn describe(&self) -> String {
        format!(
            "LabJack {} over {} (serial {})",
            device_type_name(self.info.device_type),
            connection_type_name(self.info.connection_type),
            self.info.serial_number
        )
    }

    fn close(&mut self) -> Result<(), AcqError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        // Safety: the handle came from LJM_OpenS and is closed once.
        let code = unsafe { (self.api.close)(self.handle) };
        self.api.check(code, "LJM_Close").map_err(AcqError::DeviceUnavailable)?;
        info!(handle = self.handle, "LabJack handle closed");
        Ok(())
    }
}

impl Drop for LjmDevice {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Closing LabJack handle on drop failed: {e}");
        }
    }
}

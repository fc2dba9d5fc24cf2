//! Virtual dispatch into host-side overrides.
//!
//! A user-defined class carries a [`ScriptInstance`]: the set of overrides
//! the host implements for the engine's virtual methods. At construction
//! time the bridge attaches a callback table as the instance's script, so
//! the engine can run its usual capability-query-then-call dispatch
//! against host code.

use std::sync::Arc;

use vesper_ffi::{RawCallError, RawHandle, RawScriptInstanceInfo, RawStringName, RawVariant};

use crate::bridge::Bridge;
use crate::error::CallError;
use crate::handle::HandleToken;
use crate::object::Object;
use crate::string_name::StringName;
use crate::variant::Variant;

/// Result of dispatching to an override: distinguishes "no override" from
/// an override that ran and returned nothing.
pub enum OverrideCall {
    Found(Variant),
    NotFound,
}

/// Host-side overrides of a user-defined class.
pub trait ScriptInstance: Send + Sync {
    /// Name the instance registers under on the native side.
    fn class_name(&self) -> &str;

    /// Capability query: whether `method` is overridden.
    fn has_override(&self, method: &str) -> bool;

    /// Invokes an override. Returns [`OverrideCall::NotFound`] when the
    /// method is not overridden.
    fn call_override(&self, method: &str, args: &[Variant]) -> Result<OverrideCall, CallError>;
}

/// Context handed to the engine as script-instance userdata.
struct ScriptCtx {
    bridge: &'static Bridge,
    token: HandleToken,
}

pub(super) fn attach_script_instance(object: &Arc<Object>, token: HandleToken) {
    let bridge = object.bridge();
    let script = object
        .script_ref()
        .expect("attach_script_instance on an object without a script");

    let ctx = Box::new(ScriptCtx { bridge, token });
    let info = RawScriptInstanceInfo {
        userdata: Box::into_raw(ctx) as RawHandle,
        has_method: Some(script_has_method),
        call_method: Some(script_call_method),
        free: Some(script_free),
    };

    let class = StringName::new(bridge, script.class_name());
    let raw_class = class.raw();
    unsafe {
        (bridge.interface().object_set_script_instance)(object.native_ptr(), &raw_class, &info);
    }
}

impl Object {
    pub(super) fn script_ref(&self) -> Option<&dyn ScriptInstance> {
        self.script.as_deref()
    }
}

fn name_text(bridge: &'static Bridge, name: *const RawStringName) -> String {
    unsafe {
        let len = (bridge.interface().string_name_text)(name, std::ptr::null_mut(), 0);
        let mut buf = vec![0u8; len];
        (bridge.interface().string_name_text)(name, buf.as_mut_ptr(), len);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

unsafe extern "C" fn script_has_method(userdata: RawHandle, name: *const RawStringName) -> bool {
    let ctx = unsafe { &*(userdata as usize as *const ScriptCtx) };
    let Some(object) = ctx.bridge.handles().resolve::<Object>(ctx.token) else {
        return false;
    };
    let Some(script) = object.script_ref() else {
        return false;
    };
    script.has_override(&name_text(ctx.bridge, name))
}

unsafe extern "C" fn script_call_method(
    userdata: RawHandle,
    name: *const RawStringName,
    args: *const RawVariant,
    arg_count: usize,
    ret: *mut RawVariant,
    error: *mut RawCallError,
) {
    let ctx = unsafe { &*(userdata as usize as *const ScriptCtx) };
    let write_error = |status: CallError| {
        let raw: RawCallError = status.into();
        unsafe { *error = raw };
    };

    let Some(object) = ctx.bridge.handles().resolve::<Object>(ctx.token) else {
        write_error(CallError::InstanceIsNull);
        return;
    };
    let Some(script) = object.script_ref() else {
        write_error(CallError::InstanceIsNull);
        return;
    };

    // The argument slots are borrowed from the engine; copy them into
    // owned values before handing them to host code.
    let raw_args = if arg_count == 0 {
        &[]
    } else {
        unsafe { std::slice::from_raw_parts(args, arg_count) }
    };
    let variants: Vec<Variant> = raw_args
        .iter()
        .map(|raw| Variant::copy(ctx.bridge, raw))
        .collect();

    match script.call_override(&name_text(ctx.bridge, name), &variants) {
        Ok(OverrideCall::Found(value)) => {
            unsafe {
                *ret = value.into_raw();
                *error = RawCallError::OK;
            };
        }
        Ok(OverrideCall::NotFound) => write_error(CallError::InvalidMethod),
        Err(err) => write_error(err),
    }
}

unsafe extern "C" fn script_free(userdata: RawHandle) {
    drop(unsafe { Box::from_raw(userdata as usize as *mut ScriptCtx) });
}

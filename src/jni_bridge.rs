// Java 层入口：com.anrtrace.SystemAnrMonitor 的 native 方法
use crate::api::{self, AnrObserver};
use crate::errno::Errno;
use crate::log;
use jni::JNIEnv;
use jni::JavaVM;
use jni::objects::{GlobalRef, JClass, JObject, JString};
use jni::sys::jint;
use std::sync::Arc;

// 持有 Java 观察者的全局引用，回调时附着当前线程
struct JavaObserver {
    vm: JavaVM,
    observer: GlobalRef,
}

impl AnrObserver for JavaObserver {
    fn on_system_anr(&self) {
        let mut env = match self.vm.attach_current_thread_permanently() {
            Ok(env) => env,
            Err(_) => return,
        };
        if env
            .call_method(self.observer.as_obj(), "onSystemAnr", "()V", &[])
            .is_err()
            && env.exception_check().unwrap_or(false)
        {
            let _ = env.exception_clear();
        }
    }
}

fn read_path(env: &mut JNIEnv, value: &JString) -> Result<String, Errno> {
    if value.is_null() {
        return Err(Errno::InvalidArg);
    }
    env.get_string(value)
        .map(String::from)
        .map_err(|_| Errno::InvalidArg)
}

fn register_from_java(
    env: &mut JNIEnv,
    observer: &JObject,
    anr_path: &JString,
    print_path: &JString,
) -> Result<(), Errno> {
    if observer.is_null() {
        return Err(Errno::InvalidArg);
    }
    let anr_path = read_path(env, anr_path)?;
    let print_path = read_path(env, print_path)?;
    let vm = env.get_java_vm().map_err(|_| Errno::Uninit)?;
    let observer = env.new_global_ref(observer).map_err(|_| Errno::Uninit)?;
    api::register(Arc::new(JavaObserver { vm, observer }), anr_path, print_path)
}

#[unsafe(no_mangle)]
pub extern "system" fn Java_com_anrtrace_SystemAnrMonitor_nativeRegister<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass<'local>,
    observer: JObject<'local>,
    anr_path: JString<'local>,
    print_path: JString<'local>,
) -> jint {
    match register_from_java(&mut env, &observer, &anr_path, &print_path) {
        Ok(()) => Errno::Ok.as_i32(),
        Err(err) => {
            log::error(format_args!("nativeRegister failed: {err}"));
            err.as_i32()
        }
    }
}

#[unsafe(no_mangle)]
pub extern "system" fn Java_com_anrtrace_SystemAnrMonitor_nativeUnregister<'local>(
    _env: JNIEnv<'local>,
    _class: JClass<'local>,
) {
    api::unregister();
}

#[unsafe(no_mangle)]
pub extern "system" fn Java_com_anrtrace_SystemAnrMonitor_nativeRequestDump<'local>(
    _env: JNIEnv<'local>,
    _class: JClass<'local>,
) -> jint {
    match api::request_self_dump() {
        Ok(()) => Errno::Ok.as_i32(),
        Err(err) => err.as_i32(),
    }
}

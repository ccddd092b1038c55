/// Build the argument list of an intercepted call.
///
/// ```ignore
/// self.mock.call(&add(), args![a, b])
/// ```
#[macro_export]
macro_rules! args {
    () => {
        ::std::vec::Vec::<$crate::Value>::new()
    };
    ($($arg:expr),+ $(,)?) => {
        vec![$($crate::Value::from($arg)),+]
    };
}

use std::marker::PhantomData;

use serde::ser::{SerializeSeq, Serializer};

/// A typed remote call: a method name, positional params and the shape of
/// the result the host answers with.
pub trait Call {
    type Response: serde::de::DeserializeOwned;

    fn method(&self) -> &str;
    fn serialize_params<S: SerializeSeq>(&self, _serializer: &mut S) -> Result<(), S::Error> {
        Ok(())
    }
    fn to_params(&self) -> Params<'_, Self>
    where
        Self: Sized,
    {
        Params::new(self)
    }
}

/// Serializes a [`Call`]'s params as a JSON array.
#[derive(Debug)]
pub struct Params<'a, T> {
    call: &'a T,
}

impl<'a, T> Params<'a, T> {
    pub fn new(call: &'a T) -> Self {
        Self { call }
    }
}

impl<T> serde::Serialize for Params<'_, T>
where
    T: Call,
{
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(None)?;
        self.call.serialize_params(&mut seq)?;
        seq.end()
    }
}

/// Any method with dynamic params and a response type chosen by the caller.
///
/// ```
/// use postrpc::call::MethodCall;
///
/// let call = MethodCall::<String>::new("eth_getBalance")
///     .param("0x407d73d8a49eeb85d32cf465507dd71d507100c1")
///     .param("latest");
/// assert_eq!(call.params().len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct MethodCall<R> {
    method: String,
    params: Vec<serde_json::Value>,
    _response: PhantomData<fn() -> R>,
}

impl<R> MethodCall<R> {
    pub fn new<S: Into<String>>(method: S) -> Self {
        Self {
            method: method.into(),
            params: Vec::new(),
            _response: PhantomData,
        }
    }

    pub fn param<V: Into<serde_json::Value>>(mut self, value: V) -> Self {
        self.params.push(value.into());
        self
    }

    pub fn params(&self) -> &[serde_json::Value] {
        &self.params
    }
}

impl<R> Call for MethodCall<R>
where
    R: serde::de::DeserializeOwned,
{
    type Response = R;

    fn method(&self) -> &str {
        &self.method
    }

    fn serialize_params<S: SerializeSeq>(&self, serializer: &mut S) -> Result<(), S::Error> {
        for param in &self.params {
            serializer.serialize_element(param)?;
        }
        Ok(())
    }
}

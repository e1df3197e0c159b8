use futures::future::BoxFuture;
use std::future::Future;

type Step<T, E> = Box<dyn Fn(T) -> BoxFuture<'static, Result<T, E>> + Send + Sync>;

#[derive(Debug, thiserror::Error)]
#[error("step `{step}` failed: {source}")]
pub struct ChainError<E> {
    pub step: String,
    #[source]
    pub source: E,
}

/// Ordered list of named async steps. Each step receives the previous
/// step's output; the first failure stops the run.
///
/// Names are labels only: registering the same name twice adds a second
/// step, and both run.
pub struct Chain<T, E> {
    steps: Vec<(String, Step<T, E>)>,
}

impl<T, E> Default for Chain<T, E> {
    fn default() -> Self {
        Self { steps: Vec::new() }
    }
}

impl<T, E> Chain<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_step<F, Fut>(&mut self, name: impl Into<String>, step: F) -> &mut Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        self.steps.push((name.into(), Box::new(move |input| Box::pin(step(input)))));
        self
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub async fn run(&self, input: T) -> Result<T, ChainError<E>> {
        self.run_observed(input, |_| {}).await
    }

    /// Like `run`, calling `observer` with each step's name before it starts
    pub async fn run_observed(
        &self,
        input: T,
        mut observer: impl FnMut(&str),
    ) -> Result<T, ChainError<E>> {
        let mut value = input;
        for (name, step) in &self.steps {
            observer(name);
            value = step(value).await.map_err(|source| ChainError {
                step: name.clone(),
                source,
            })?;
        }
        Ok(value)
    }
}

//! In-memory department/transaction index.
//!
//! Built once at start-up, then sealed and shared read-only between every
//! transport.

use crate::document::Document;
use crate::errors::RegistryError;
use crate::transaction::{Transaction, TransactionHolder};
use std::sync::Arc;
use tracing::{debug, warn};

/// Named group of transactions.
#[derive(Debug)]
pub struct Department {
    name: String,
    slug: String,
    transactions: Vec<Arc<TransactionHolder>>,
}

impl Department {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            slug: name.to_lowercase(),
            transactions: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn transactions(&self) -> &[Arc<TransactionHolder>] {
        &self.transactions
    }
}

#[derive(Debug, Default)]
pub struct Registry {
    departments: Vec<Department>,
    sealed: bool,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `holder` to `department`, creating the department if absent.
    ///
    /// Rejects a second transaction with the same name in one department and
    /// any registration after [`Registry::seal`].
    pub fn register(
        &mut self,
        department: &str,
        holder: TransactionHolder,
    ) -> Result<(), RegistryError> {
        if self.sealed {
            return Err(RegistryError::Sealed);
        }

        let index = match self.departments.iter().position(|d| d.name == department) {
            Some(index) => index,
            None => {
                self.departments.push(Department::new(department));
                self.departments.len() - 1
            }
        };
        let entry = &mut self.departments[index];

        if entry.transactions.iter().any(|t| t.name() == holder.name()) {
            warn!(
                department = %department,
                transaction = %holder.name(),
                "duplicate transaction registration rejected"
            );
            return Err(RegistryError::DuplicateTransaction {
                department: department.to_string(),
                transaction: holder.name().to_string(),
            });
        }

        debug!(department = %department, transaction = %holder.name(), "transaction registered");
        entry.transactions.push(Arc::new(holder));
        Ok(())
    }

    /// Shorthand for registering `T` under `name`.
    pub fn register_transaction<T, F>(
        &mut self,
        department: &str,
        name: &str,
        init: F,
    ) -> Result<(), RegistryError>
    where
        T: Transaction,
        F: Fn(&Document) -> T + Send + Sync + 'static,
    {
        self.register(department, TransactionHolder::new(name, init))
    }

    /// Exact match on both keys; the first registered match wins.
    pub fn lookup(&self, department: &str, transaction: &str) -> Option<Arc<TransactionHolder>> {
        self.departments
            .iter()
            .filter(|d| d.name == department)
            .flat_map(|d| d.transactions.iter())
            .find(|t| t.name() == transaction)
            .cloned()
    }

    /// Departments in registration order.
    pub fn departments(&self) -> &[Department] {
        &self.departments
    }

    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn len(&self) -> usize {
        self.departments.iter().map(|d| d.transactions.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

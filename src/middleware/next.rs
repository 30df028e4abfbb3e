use std::fmt;

use axum::{extract::Request, response::Response};

use crate::Procedure;

/// The rest of the middleware chain, ending in the procedure itself.
pub struct Next {
    procedure: Procedure,
    index: usize,
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next").field("index", &self.index).finish()
    }
}

impl Next {
    pub(crate) fn new(procedure: Procedure) -> Self {
        Self {
            procedure,
            index: 0,
        }
    }

    pub fn procedure(&self) -> &Procedure {
        &self.procedure
    }

    pub async fn run(self, req: Request) -> Response {
        match self.procedure.middleware().get(self.index).cloned() {
            Some(middleware) => {
                let next = Next {
                    procedure: self.procedure,
                    index: self.index + 1,
                };
                middleware.run(req, next).await
            }
            None => self.procedure.serve(req).await,
        }
    }
}

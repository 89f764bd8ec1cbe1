use sidetree_protocol::{OperationValidator, ProtocolError, ProtocolResult};
use sidetree_types::Operation;

use crate::parser::OperationParser;

/// Front-door check run before an operation is queued.
pub struct V1OperationValidator {
    parser: OperationParser,
}

impl V1OperationValidator {
    pub fn new(parser: OperationParser) -> Self {
        Self { parser }
    }
}

impl OperationValidator for V1OperationValidator {
    fn validate(&self, op: &Operation) -> ProtocolResult<()> {
        let request = self.parser.parse(op.op_type(), op.payload())?;
        let suffix = self.parser.unique_suffix(&request)?;
        if suffix != op.unique_suffix() {
            return Err(ProtocolError::InvalidOperation(format!(
                "operation suffix {} does not match request suffix {suffix}",
                op.unique_suffix()
            )));
        }
        Ok(())
    }
}

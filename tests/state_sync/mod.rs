mod convergence_case;
